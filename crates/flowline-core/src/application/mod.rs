/// Process Manager boundary service
pub mod process_manager;
