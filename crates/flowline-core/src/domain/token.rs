//! Token tree
//!
//! A token is one concurrent locus of execution inside a process instance.
//! Tokens form a tree rooted at the token created with the instance; forks
//! allocate children and released branches stay in the tree so their history
//! remains inspectable.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: Token ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub Uuid);

impl TokenId {
    /// Generate a fresh token id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the per-instance token tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    id: TokenId,
    parent_id: Option<TokenId>,
    execution_point: Option<String>,
    children: Vec<Token>,
    released: bool,
}

impl Token {
    /// Create a root token with no execution point
    pub fn new_root() -> Self {
        Self {
            id: TokenId::new(),
            parent_id: None,
            execution_point: None,
            children: Vec::new(),
            released: false,
        }
    }

    /// Token id
    pub fn id(&self) -> TokenId {
        self.id
    }

    /// Id of the token this one was forked from
    pub fn parent_id(&self) -> Option<TokenId> {
        self.parent_id
    }

    /// Name of the model element the token is positioned at
    pub fn execution_point(&self) -> Option<&str> {
        self.execution_point.as_deref()
    }

    /// Child tokens, released ones included
    pub fn children(&self) -> &[Token] {
        &self.children
    }

    /// Whether the token reached a terminal state
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether the token can still move
    pub fn is_active(&self) -> bool {
        !self.released
    }

    pub(crate) fn set_execution_point(&mut self, point: Option<String>) {
        self.execution_point = point;
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Token] {
        &mut self.children
    }

    /// Allocate a child token positioned where this token is
    pub fn allocate_child(&mut self) -> Result<&mut Token, CoreError> {
        if self.released {
            return Err(CoreError::InvalidState(format!(
                "Cannot allocate a child from released token {}",
                self.id
            )));
        }

        self.children.push(Token {
            id: TokenId::new(),
            parent_id: Some(self.id),
            execution_point: self.execution_point.clone(),
            children: Vec::new(),
            released: false,
        });

        let index = self.children.len() - 1;
        Ok(&mut self.children[index])
    }

    /// Mark the token as released
    ///
    /// The token stays in its parent's child list.
    pub fn release(&mut self) -> Result<(), CoreError> {
        if self.released {
            return Err(CoreError::InvalidState(format!(
                "Token {} is already released",
                self.id
            )));
        }
        self.released = true;
        Ok(())
    }

    /// Depth-first search of this token and all of its descendants
    pub fn find_by_id(&self, id: TokenId) -> Option<&Token> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_id(id))
    }

    /// Mutable variant of [`Token::find_by_id`]
    pub fn find_by_id_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_by_id_mut(id))
    }

    /// Lazily walk descendants reachable through non-released tokens
    pub fn active_descendants(&self) -> ActiveDescendants<'_> {
        ActiveDescendants {
            stack: self.children.iter().rev().filter(|c| c.is_active()).collect(),
        }
    }

    /// Whether any direct child is still active
    pub fn has_active_children(&self) -> bool {
        self.children.iter().any(Token::is_active)
    }

    /// Ids from this token down to `id`, both ends included
    pub fn lineage(&self, id: TokenId) -> Option<Vec<TokenId>> {
        let mut path = Vec::new();
        if self.collect_path(id, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn collect_path(&self, id: TokenId, path: &mut Vec<TokenId>) -> bool {
        path.push(self.id);
        if self.id == id {
            return true;
        }
        for child in &self.children {
            if child.collect_path(id, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Whether this token or any descendant has an execution point
    pub fn has_execution_point(&self) -> bool {
        self.execution_point.is_some() || self.children.iter().any(Token::has_execution_point)
    }
}

/// Iterator returned by [`Token::active_descendants`]
pub struct ActiveDescendants<'a> {
    stack: Vec<&'a Token>,
}

impl<'a> Iterator for ActiveDescendants<'a> {
    type Item = &'a Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.stack.pop()?;
        self.stack
            .extend(token.children.iter().rev().filter(|c| c.is_active()));
        Some(token)
    }
}
