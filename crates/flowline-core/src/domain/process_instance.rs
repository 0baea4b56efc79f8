use crate::config::default_max_advance_steps;
use crate::domain::compensation;
use crate::domain::data::DataStore;
use crate::domain::element::{ActivityOutcome, Element, ExecutionContext};
use crate::domain::history::{HistoryItem, HistoryKind, HistoryLog};
use crate::domain::model::{ProcessModel, ProcessModelId};
use crate::domain::token::{Token, TokenId};
use crate::{CoreError, DataPacket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Value object: Process Instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessInstanceId(pub String);

impl ProcessInstanceId {
    /// Generate a random instance id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ProcessInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a token goes after leaving an element
enum Departure {
    /// The token moved to the single target
    Continue,
    /// The token forked; these children carry on
    Forked(Vec<TokenId>),
}

/// State of a token reaching a join gateway
enum JoinState {
    /// No fork parent to wait for
    PassThrough,
    /// Siblings have not arrived yet
    Waiting,
    /// Siblings were dissolved; the parent continues
    Merged(TokenId),
    /// A sibling branch failed, so the join can never fire
    Abandoned,
}

/// Aggregate: Process instance
///
/// Owns one token tree, one history log and one data store. All state
/// transitions go through [`handle_event`](Self::handle_event),
/// [`handle_activity_completion`](Self::handle_activity_completion) and
/// [`handle_activity_failure`](Self::handle_activity_failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Unique identifier
    pub id: ProcessInstanceId,

    /// Model this instance runs
    pub process_model_id: ProcessModelId,

    token: Token,

    history: HistoryLog,

    data: DataStore,

    done: bool,

    compensated: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    #[serde(skip, default = "default_max_advance_steps")]
    max_advance_steps: usize,
}

impl ProcessInstance {
    /// Create a new instance of a model
    pub fn new(process_model_id: ProcessModelId) -> Self {
        let now = Utc::now();
        Self {
            id: ProcessInstanceId::generate(),
            process_model_id,
            token: Token::new_root(),
            history: HistoryLog::new(),
            data: DataStore::new(),
            done: false,
            compensated: false,
            created_at: now,
            updated_at: now,
            max_advance_steps: default_max_advance_steps(),
        }
    }

    /// Create a new instance of `model`
    pub fn create(model: &ProcessModel) -> Self {
        Self::new(model.id().clone())
    }

    /// Bound the number of elements one call may traverse
    pub fn with_max_advance_steps(mut self, steps: usize) -> Self {
        self.max_advance_steps = steps;
        self
    }

    /// Set the traversal bound, e.g. after loading from a store
    pub fn set_max_advance_steps(&mut self, steps: usize) {
        self.max_advance_steps = steps;
    }

    /// Root of the token tree
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Id of the root token
    pub fn root_token_id(&self) -> TokenId {
        self.token.id()
    }

    /// Read-only history
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Materialized data objects
    pub fn data_objects(&self) -> &DataStore {
        &self.data
    }

    /// Whether some token is positioned at an element
    pub fn is_running(&self) -> bool {
        self.token.has_execution_point()
    }

    /// Whether an end event was reached
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether a failed token finished compensating
    pub fn is_compensated(&self) -> bool {
        self.compensated
    }

    /// Whether any event was ever accepted
    pub fn has_started(&self) -> bool {
        !self.history.is_empty()
    }

    /// Whether `activity` completed anywhere in this instance
    pub fn was_activity_completed(&self, activity: &str) -> bool {
        self.history.was_completed(activity)
    }

    /// Cached value of a data object, if materialized
    pub fn get_data_object_value(&self, name: &str) -> Option<&DataPacket> {
        self.data.get(name)
    }

    /// Value of a data object, created from the model's factory on first access
    pub fn get_data_element_instance(
        &mut self,
        model: &ProcessModel,
        name: &str,
    ) -> Result<DataPacket, CoreError> {
        self.data.get_or_create(model, name)
    }

    /// Non-released tokens, root first
    pub fn active_tokens(&self) -> Vec<&Token> {
        if self.token.is_released() {
            return Vec::new();
        }
        std::iter::once(&self.token)
            .chain(self.token.active_descendants())
            .collect()
    }

    /// Tokens parked at a catcher that would accept `event_data`
    pub fn tokens_waiting_for(&self, model: &ProcessModel, event_data: &DataPacket) -> Vec<TokenId> {
        self.active_tokens()
            .into_iter()
            .filter(|token| !token.has_active_children())
            .filter_map(|token| {
                let point = token.execution_point()?;
                match &model.element(point)?.element {
                    Element::EventCatcher(catcher) if catcher.can_handle(event_data) => {
                        Some(token.id())
                    }
                    _ => None,
                }
            })
            .collect()
    }

    /// Deliver an event to a token
    ///
    /// Before the instance starts, the event is matched against the model's
    /// start event catchers and seeds the root token. Returns the tokens that
    /// moved; an empty result means the event was not accepted.
    pub fn handle_event(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        event_data: DataPacket,
    ) -> Result<Vec<TokenId>, CoreError> {
        let Some(token) = self.accepting_token(token_id) else {
            debug!(instance_id = %self.id, token_id = %token_id, "Event ignored, token not accepting");
            return Ok(Vec::new());
        };

        let catcher = match token.execution_point().map(str::to_string) {
            None if !self.has_started() => model
                .start_event_catchers()
                .find(|(_, catcher)| catcher.can_handle(&event_data))
                .map(|(name, catcher)| (name.to_string(), Arc::clone(catcher))),
            None => None,
            Some(point) => match model.element(&point).map(|named| &named.element) {
                Some(Element::EventCatcher(catcher)) if catcher.can_handle(&event_data) => {
                    Some((point, Arc::clone(catcher)))
                }
                _ => None,
            },
        };

        let Some((element, catcher)) = catcher else {
            debug!(instance_id = %self.id, token_id = %token_id, "Event not accepted");
            return Ok(Vec::new());
        };

        self.set_execution_point(token_id, Some(element.clone()))?;
        self.with_context(model, token_id, &element, &element, |ctx| {
            catcher.handle(ctx, &event_data)
        })??;
        self.history
            .append(token_id, &element, event_data, HistoryKind::EventCaught);
        self.touch();

        debug!(instance_id = %self.id, token_id = %token_id, element = %element, "Event caught");

        match self.leave(model, token_id, &element)? {
            Departure::Continue => self.advance(model, vec![token_id]),
            Departure::Forked(children) => self.advance(model, children),
        }
    }

    /// Report that a suspended activity completed
    pub fn handle_activity_completion(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        completion_data: DataPacket,
    ) -> Result<Vec<TokenId>, CoreError> {
        let Some(activity) = self.awaiting_activity(model, token_id) else {
            debug!(instance_id = %self.id, token_id = %token_id, "Completion ignored, no activity awaiting");
            return Ok(Vec::new());
        };

        self.history.append(
            token_id,
            &activity,
            completion_data,
            HistoryKind::ActivityCompleted,
        );
        self.touch();

        debug!(instance_id = %self.id, token_id = %token_id, element = %activity, "Activity completed");

        if self.is_compensating(model, token_id)? {
            self.compensate(model, token_id)?;
            return Ok(vec![token_id]);
        }

        match self.leave(model, token_id, &activity)? {
            Departure::Continue => self.advance(model, vec![token_id]),
            Departure::Forked(children) => self.advance(model, children),
        }
    }

    /// Report that a suspended activity failed, starting compensation
    pub fn handle_activity_failure(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        failure_data: DataPacket,
    ) -> Result<Vec<TokenId>, CoreError> {
        let Some(activity) = self.awaiting_activity(model, token_id) else {
            debug!(instance_id = %self.id, token_id = %token_id, "Failure ignored, no activity awaiting");
            return Ok(Vec::new());
        };

        warn!(instance_id = %self.id, token_id = %token_id, element = %activity, "Activity failed");

        self.history
            .append(token_id, &activity, failure_data, HistoryKind::ActivityFailed);
        self.touch();
        self.compensate(model, token_id)?;

        Ok(vec![token_id])
    }

    /// Walk tokens through the model until each suspends or terminates
    fn advance(
        &mut self,
        model: &ProcessModel,
        tokens: Vec<TokenId>,
    ) -> Result<Vec<TokenId>, CoreError> {
        let mut queue: VecDeque<TokenId> = tokens.into();
        let mut affected = Vec::new();
        let mut steps = 0usize;

        while let Some(token_id) = queue.pop_front() {
            let mut current = token_id;
            push_unique(&mut affected, current);

            loop {
                steps += 1;
                if steps > self.max_advance_steps {
                    return Err(CoreError::UnsupportedModel(format!(
                        "Traversal exceeded {} steps",
                        self.max_advance_steps
                    )));
                }

                let Some(point) = self
                    .token
                    .find_by_id(current)
                    .and_then(|token| token.execution_point())
                    .map(str::to_string)
                else {
                    break;
                };

                let element = model
                    .element(&point)
                    .map(|named| named.element.clone())
                    .ok_or_else(|| {
                        CoreError::UnsupportedModel(format!("Unknown element: {}", point))
                    })?;

                debug!(
                    instance_id = %self.id,
                    token_id = %current,
                    element = %point,
                    kind = element.kind_name(),
                    "Advancing token"
                );

                match element {
                    Element::Activity(activity) => {
                        self.history.append(
                            current,
                            &point,
                            DataPacket::null(),
                            HistoryKind::ActivityStarted,
                        );

                        let outcome = self
                            .with_context(model, current, &point, &point, |ctx| activity.run(ctx))?;

                        match into_outcome(outcome)? {
                            ActivityOutcome::Completed(data) => {
                                self.history.append(
                                    current,
                                    &point,
                                    data,
                                    HistoryKind::ActivityCompleted,
                                );
                                if let Departure::Forked(children) =
                                    self.leave(model, current, &point)?
                                {
                                    queue.extend(children);
                                    break;
                                }
                            }
                            ActivityOutcome::Pending(reason) => {
                                debug!(
                                    instance_id = %self.id,
                                    token_id = %current,
                                    element = %point,
                                    reason = %reason,
                                    "Activity suspended"
                                );
                                break;
                            }
                            ActivityOutcome::Fault(reason) => {
                                warn!(
                                    instance_id = %self.id,
                                    token_id = %current,
                                    element = %point,
                                    reason = %reason,
                                    "Activity faulted"
                                );
                                self.history.append(
                                    current,
                                    &point,
                                    DataPacket::from_string(&reason),
                                    HistoryKind::ActivityFailed,
                                );
                                self.compensate(model, current)?;
                                break;
                            }
                        }
                    }
                    Element::EventThrower(thrower) => {
                        self.history.append(
                            current,
                            &point,
                            DataPacket::null(),
                            HistoryKind::EventThrown,
                        );
                        self.with_context(model, current, &point, &point, |ctx| thrower.throw(ctx))??;

                        if model.is_end_event_thrower(&point) {
                            self.retire(model, current)?;
                            self.done = true;
                            info!(instance_id = %self.id, token_id = %current, element = %point, "End event reached");
                            break;
                        }

                        self.follow_single(model, current, &point)?;
                    }
                    Element::EventCatcher(_) => break,
                    Element::ParallelGateway => {
                        if model.incoming_count(&point) > 1 {
                            match self.join(model, current, &point)? {
                                JoinState::Waiting => break,
                                JoinState::Abandoned => {
                                    self.retire(model, current)?;
                                    break;
                                }
                                JoinState::Merged(parent) => {
                                    current = parent;
                                    push_unique(&mut affected, parent);
                                }
                                JoinState::PassThrough => {}
                            }
                        }

                        if let Departure::Forked(children) = self.leave(model, current, &point)? {
                            queue.extend(children);
                            break;
                        }
                    }
                }
            }
        }

        // forked parents are reported through their children
        affected.retain(|id| {
            self.token
                .find_by_id(*id)
                .is_some_and(|token| !token.has_active_children())
        });

        self.touch();
        Ok(affected)
    }

    /// Run owed compensations for a failed token until one suspends or all settle
    fn compensate(&mut self, model: &ProcessModel, token_id: TokenId) -> Result<(), CoreError> {
        loop {
            let lineage = self.lineage(token_id)?;
            let Some(pending) =
                compensation::pending_steps(model, &self.history, token_id, &lineage)
            else {
                return Ok(());
            };

            let Some(step) = pending.into_iter().next() else {
                self.retire(model, token_id)?;
                self.compensated = true;
                info!(instance_id = %self.id, token_id = %token_id, "Compensation finished");
                return Ok(());
            };

            let activity = match model.element(&step.compensation).map(|named| &named.element) {
                Some(Element::Activity(activity)) => Arc::clone(activity),
                _ => {
                    return Err(CoreError::UnsupportedModel(format!(
                        "Compensation {} is not an activity",
                        step.compensation
                    )))
                }
            };

            debug!(
                instance_id = %self.id,
                token_id = %token_id,
                element = %step.compensation,
                compensates = %step.activity,
                "Running compensation"
            );

            self.set_execution_point(token_id, Some(step.compensation.clone()))?;
            self.history.append(
                token_id,
                &step.compensation,
                step.started_payload(),
                HistoryKind::ActivityStarted,
            );

            let outcome = self.with_context(
                model,
                token_id,
                &step.compensation,
                &step.activity,
                |ctx| activity.run(ctx),
            )?;

            match into_outcome(outcome)? {
                ActivityOutcome::Completed(data) => {
                    self.history.append(
                        token_id,
                        &step.compensation,
                        data,
                        HistoryKind::ActivityCompleted,
                    );
                }
                ActivityOutcome::Pending(reason) => {
                    debug!(instance_id = %self.id, token_id = %token_id, reason = %reason, "Compensation suspended");
                    return Ok(());
                }
                ActivityOutcome::Fault(reason) => {
                    warn!(
                        instance_id = %self.id,
                        token_id = %token_id,
                        element = %step.compensation,
                        reason = %reason,
                        "Compensation faulted, continuing with the next one"
                    );
                    self.history.append(
                        token_id,
                        &step.compensation,
                        DataPacket::from_string(&reason),
                        HistoryKind::ActivityFailed,
                    );
                }
            }
        }
    }

    fn is_compensating(&self, model: &ProcessModel, token_id: TokenId) -> Result<bool, CoreError> {
        let lineage = self.lineage(token_id)?;
        Ok(compensation::pending_steps(model, &self.history, token_id, &lineage).is_some())
    }

    /// Fork-or-continue off the outgoing flows of `element`
    fn leave(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        element: &str,
    ) -> Result<Departure, CoreError> {
        let mut targets: Vec<String> = model
            .outgoing(element)
            .into_iter()
            .map(|flow| flow.to.clone())
            .collect();

        match targets.len() {
            0 => Err(CoreError::UnsupportedModel(format!(
                "Element {} has no outgoing sequence flow",
                element
            ))),
            1 => {
                self.set_execution_point(token_id, targets.pop())?;
                Ok(Departure::Continue)
            }
            _ => {
                let token = self.token_mut(token_id)?;
                let mut children = Vec::with_capacity(targets.len());
                for target in targets {
                    let child = token.allocate_child()?;
                    child.set_execution_point(Some(target));
                    children.push(child.id());
                }

                debug!(
                    instance_id = %self.id,
                    token_id = %token_id,
                    element = %element,
                    children = children.len(),
                    "Token forked"
                );
                Ok(Departure::Forked(children))
            }
        }
    }

    /// Move along the single outgoing flow of a mid-traversal element
    fn follow_single(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        element: &str,
    ) -> Result<(), CoreError> {
        let outgoing = model.outgoing(element);
        if outgoing.len() != 1 {
            return Err(CoreError::UnsupportedModel(format!(
                "Element {} must have exactly one outgoing sequence flow, found {}",
                element,
                outgoing.len()
            )));
        }
        let target = outgoing[0].to.clone();
        self.set_execution_point(token_id, Some(target))
    }

    /// Join barrier keyed on the fork parent
    fn join(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        join: &str,
    ) -> Result<JoinState, CoreError> {
        let Some(parent_id) = self.token_ref(token_id)?.parent_id() else {
            return Ok(JoinState::PassThrough);
        };

        let siblings: Vec<TokenId> = self
            .token_ref(parent_id)?
            .children()
            .iter()
            .map(Token::id)
            .collect();
        for sibling in siblings {
            if self.branch_failed(model, sibling)? {
                debug!(instance_id = %self.id, token_id = %token_id, element = %join, "Join abandoned, a sibling branch failed");
                return Ok(JoinState::Abandoned);
            }
        }

        let parent = self.token_mut(parent_id)?;
        let arrived = parent
            .children()
            .iter()
            .filter(|child| child.is_active())
            .all(|child| child.execution_point() == Some(join));

        if !arrived {
            debug!(instance_id = %self.id, token_id = %token_id, element = %join, "Waiting at join");
            return Ok(JoinState::Waiting);
        }

        for child in parent.children_mut().iter_mut().filter(|c| c.is_active()) {
            child.set_execution_point(None);
            child.release()?;
        }
        parent.set_execution_point(Some(join.to_string()));

        debug!(instance_id = %self.id, token_id = %parent_id, element = %join, "Branches joined");
        Ok(JoinState::Merged(parent_id))
    }

    /// Release a token that reached a terminal point
    ///
    /// Ancestors left without active children are released as well. When the
    /// retired branch failed, siblings parked at a join are released with it.
    fn retire(&mut self, model: &ProcessModel, token_id: TokenId) -> Result<(), CoreError> {
        self.finish_token(token_id)?;

        let mut current = token_id;
        while let Some(parent_id) = self.token_ref(current)?.parent_id() {
            if self.branch_failed(model, current)? {
                self.abandon_join(model, parent_id)?;
            }

            let parent = self.token_ref(parent_id)?;
            if parent.is_released() || parent.has_active_children() {
                break;
            }

            debug!(instance_id = %self.id, token_id = %parent_id, "Last branch finished, releasing parent");
            self.finish_token(parent_id)?;
            current = parent_id;
        }

        Ok(())
    }

    /// Release the children of `parent_id` waiting at a join gateway
    fn abandon_join(&mut self, model: &ProcessModel, parent_id: TokenId) -> Result<(), CoreError> {
        let waiting: Vec<TokenId> = self
            .token_ref(parent_id)?
            .children()
            .iter()
            .filter(|child| child.is_active() && !child.has_active_children())
            .filter(|child| child.execution_point().is_some_and(|point| is_join(model, point)))
            .map(Token::id)
            .collect();

        for token_id in waiting {
            debug!(instance_id = %self.id, token_id = %token_id, "Releasing branch parked at an abandoned join");
            self.finish_token(token_id)?;
        }
        Ok(())
    }

    /// Whether a regular activity failed on this token or below it
    fn branch_failed(&self, model: &ProcessModel, token_id: TokenId) -> Result<bool, CoreError> {
        let branch = self.token_ref(token_id)?;
        Ok(self.history.iter().any(|item| {
            item.kind == HistoryKind::ActivityFailed
                && !model.is_compensation_activity(&item.element_name)
                && branch.find_by_id(item.token_id).is_some()
        }))
    }

    /// Activity the token is suspended at, if it is awaiting an outcome
    fn awaiting_activity(&self, model: &ProcessModel, token_id: TokenId) -> Option<String> {
        if !self.is_running() {
            return None;
        }

        let point = self.accepting_token(token_id)?.execution_point()?;
        if !matches!(
            model.element(point).map(|named| &named.element),
            Some(Element::Activity(_))
        ) {
            return None;
        }

        let last = self.history.last_for_token(token_id)?;
        (last.kind == HistoryKind::ActivityStarted && last.element_name == point)
            .then(|| point.to_string())
    }

    /// Token that may receive an external call
    fn accepting_token(&self, token_id: TokenId) -> Option<&Token> {
        self.token
            .find_by_id(token_id)
            .filter(|token| token.is_active() && !token.has_active_children())
    }

    fn with_context<R>(
        &mut self,
        model: &ProcessModel,
        token_id: TokenId,
        element: &str,
        scope: &str,
        f: impl FnOnce(&mut ExecutionContext<'_>) -> R,
    ) -> Result<R, CoreError> {
        let lineage = self.lineage(token_id)?;
        let mut ctx = ExecutionContext::new(
            &self.id,
            token_id,
            element,
            scope,
            model,
            &self.history,
            &lineage,
            &mut self.data,
        );
        Ok(f(&mut ctx))
    }

    fn lineage(&self, token_id: TokenId) -> Result<Vec<TokenId>, CoreError> {
        self.token
            .lineage(token_id)
            .ok_or_else(|| CoreError::InvalidState(format!("Unknown token {}", token_id)))
    }

    fn token_ref(&self, token_id: TokenId) -> Result<&Token, CoreError> {
        self.token
            .find_by_id(token_id)
            .ok_or_else(|| CoreError::InvalidState(format!("Unknown token {}", token_id)))
    }

    fn token_mut(&mut self, token_id: TokenId) -> Result<&mut Token, CoreError> {
        self.token
            .find_by_id_mut(token_id)
            .ok_or_else(|| CoreError::InvalidState(format!("Unknown token {}", token_id)))
    }

    fn set_execution_point(
        &mut self,
        token_id: TokenId,
        point: Option<String>,
    ) -> Result<(), CoreError> {
        self.token_mut(token_id)?.set_execution_point(point);
        Ok(())
    }

    fn finish_token(&mut self, token_id: TokenId) -> Result<(), CoreError> {
        let token = self.token_mut(token_id)?;
        token.set_execution_point(None);
        token.release()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// History entries appended since `index`
    pub fn history_since(&self, index: usize) -> &[HistoryItem] {
        self.history.since(index)
    }
}

fn into_outcome(result: Result<ActivityOutcome, CoreError>) -> Result<ActivityOutcome, CoreError> {
    match result {
        Err(CoreError::ActivityFault(reason)) => Ok(ActivityOutcome::Fault(reason)),
        other => other,
    }
}

fn is_join(model: &ProcessModel, name: &str) -> bool {
    matches!(
        model.element(name).map(|named| &named.element),
        Some(Element::ParallelGateway)
    ) && model.incoming_count(name) > 1
}

fn push_unique(tokens: &mut Vec<TokenId>, token_id: TokenId) {
    if !tokens.contains(&token_id) {
        tokens.push(token_id);
    }
}
