//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCloud`] is an in-memory [`CloudClient`] whose operations complete
//! after a scripted number of polls. Every call is recorded so tests can assert
//! on existence checks and create requests.

use std::collections::{BTreeMap, HashMap};
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use crate::client::{ClientError, ClientFuture, CloudClient};
use crate::resource::{
    Operation, OperationState, OperationStatus, Resource, ResourceKind, ResourceRef, ResourceSpec,
};

/// A single call recorded by [`FakeCloud`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CloudCall {
    /// `get(kind, name)`.
    Get(ResourceRef),
    /// `create(spec)`.
    Create(ResourceRef),
    /// `poll_operation(op)` with the operation identifier.
    Poll(String),
    /// `list(kind)`.
    List(ResourceKind),
    /// `delete(kind, name)`.
    Delete(ResourceRef),
}

impl CloudCall {
    /// Shorthand for [`CloudCall::Get`].
    #[must_use]
    pub fn get(kind: ResourceKind, name: &str) -> Self {
        Self::Get(ResourceRef::new(kind, name))
    }

    /// Shorthand for [`CloudCall::Create`].
    #[must_use]
    pub fn create(kind: ResourceKind, name: &str) -> Self {
        Self::Create(ResourceRef::new(kind, name))
    }

    /// Shorthand for [`CloudCall::Delete`].
    #[must_use]
    pub fn delete(kind: ResourceKind, name: &str) -> Self {
        Self::Delete(ResourceRef::new(kind, name))
    }
}

/// How a scripted operation ends.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptedCompletion {
    /// The operation reaches DONE.
    Done,
    /// The operation reaches ERROR with the given message.
    Error(String),
    /// The operation stays RUNNING forever.
    Never,
}

/// Number of polls an operation takes and how it ends.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptedOperation {
    polls: u32,
    completion: ScriptedCompletion,
}

impl ScriptedOperation {
    /// Completes on the `polls`-th poll (at least one).
    #[must_use]
    pub fn done_after(polls: u32) -> Self {
        Self {
            polls: polls.max(1),
            completion: ScriptedCompletion::Done,
        }
    }

    /// Fails on the `polls`-th poll (at least one).
    #[must_use]
    pub fn error_after(polls: u32, message: impl Into<String>) -> Self {
        Self {
            polls: polls.max(1),
            completion: ScriptedCompletion::Error(message.into()),
        }
    }

    /// Never leaves the RUNNING state.
    #[must_use]
    pub const fn never_completes() -> Self {
        Self {
            polls: 1,
            completion: ScriptedCompletion::Never,
        }
    }
}

impl Default for ScriptedOperation {
    fn default() -> Self {
        Self::done_after(1)
    }
}

#[derive(Clone, Debug)]
enum CreateBehaviour {
    Operation(ScriptedOperation),
    Reject(String),
    Conflict,
}

#[derive(Clone, Debug)]
enum Effect {
    Insert(Resource),
    Remove,
}

#[derive(Clone, Debug)]
struct PendingOperation {
    target: ResourceRef,
    remaining: u32,
    completion: ScriptedCompletion,
    effect: Effect,
    finished: Option<OperationState>,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<ResourceRef, Resource>,
    create_scripts: HashMap<ResourceRef, CreateBehaviour>,
    delete_scripts: HashMap<ResourceRef, ScriptedOperation>,
    operations: BTreeMap<String, PendingOperation>,
    default_operation: ScriptedOperation,
    lookup_failure: Option<String>,
    calls: Vec<CloudCall>,
    next_operation: u64,
    next_address: u8,
}

impl State {
    fn start_operation(
        &mut self,
        target: ResourceRef,
        script: ScriptedOperation,
        effect: Effect,
    ) -> Operation {
        self.next_operation = self.next_operation.saturating_add(1);
        let id = format!("operation-{}", self.next_operation);
        self.operations.insert(
            id.clone(),
            PendingOperation {
                target: target.clone(),
                remaining: script.polls,
                completion: script.completion,
                effect,
                finished: None,
            },
        );
        Operation {
            id,
            status: OperationStatus::Pending,
            target,
        }
    }

    fn advance(&mut self, id: &str) -> Option<OperationState> {
        let pending = self.operations.get_mut(id)?;
        if let Some(finished) = &pending.finished {
            return Some(finished.clone());
        }
        if pending.completion == ScriptedCompletion::Never {
            return Some(OperationState::with_status(OperationStatus::Running));
        }
        pending.remaining = pending.remaining.saturating_sub(1);
        if pending.remaining > 0 {
            return Some(OperationState::with_status(OperationStatus::Running));
        }
        Some(self.finish(id))
    }

    fn finish(&mut self, id: &str) -> OperationState {
        let Some(pending) = self.operations.get_mut(id) else {
            return OperationState::failed("unknown operation");
        };
        let state = match &pending.completion {
            ScriptedCompletion::Error(message) => OperationState::failed(message.clone()),
            ScriptedCompletion::Done | ScriptedCompletion::Never => {
                OperationState::with_status(OperationStatus::Done)
            }
        };
        pending.finished = Some(state.clone());
        let target = pending.target.clone();
        let effect = pending.effect.clone();
        if state.status == OperationStatus::Done {
            match effect {
                Effect::Insert(resource) => {
                    self.resources.insert(target, resource);
                }
                Effect::Remove => {
                    self.resources.remove(&target);
                }
            }
        }
        state
    }

    fn created_resource(&mut self, spec: &ResourceSpec) -> Resource {
        let mut raw = spec.body();
        if let Value::Object(fields) = &mut raw {
            fields.insert(String::from("status"), Value::from("RUNNING"));
        }
        if spec.kind() == ResourceKind::Instance {
            self.next_address = self.next_address.wrapping_add(1);
            let address = format!("192.0.2.{}", self.next_address);
            let pointer = "/networkInterfaces/0/accessConfigs/0";
            if matches!(raw.pointer(pointer), Some(Value::Object(_))) {
                if let Some(Value::Object(access)) = raw.pointer_mut(pointer) {
                    access.insert(String::from("natIP"), Value::from(address));
                }
            } else if let Value::Object(fields) = &mut raw {
                fields.insert(
                    String::from("networkInterfaces"),
                    json!([{"accessConfigs": [{"natIP": address}]}]),
                );
            }
        }
        Resource::from_raw(spec.kind(), raw)
    }
}

/// In-memory scripted cloud.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
}

impl FakeCloud {
    /// Creates an empty cloud whose operations complete on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the script used for operations without a specific script.
    pub fn set_default_operation(&self, script: ScriptedOperation) {
        self.state().default_operation = script;
    }

    /// Seeds an existing resource.
    pub fn insert_existing(&self, kind: ResourceKind, name: &str) {
        let raw = json!({"name": name, "status": "RUNNING"});
        self.state()
            .resources
            .insert(ResourceRef::new(kind, name), Resource::from_raw(kind, raw));
    }

    /// Scripts the operation returned when `name` is created.
    pub fn script_create(&self, kind: ResourceKind, name: &str, script: ScriptedOperation) {
        self.state().create_scripts.insert(
            ResourceRef::new(kind, name),
            CreateBehaviour::Operation(script),
        );
    }

    /// Makes the create for `name` fail synchronously.
    pub fn reject_create(&self, kind: ResourceKind, name: &str, message: &str) {
        self.state().create_scripts.insert(
            ResourceRef::new(kind, name),
            CreateBehaviour::Reject(message.to_owned()),
        );
    }

    /// Makes the create for `name` report a same-name conflict.
    pub fn conflict_on_create(&self, kind: ResourceKind, name: &str) {
        self.state()
            .create_scripts
            .insert(ResourceRef::new(kind, name), CreateBehaviour::Conflict);
    }

    /// Scripts the operation returned when `name` is deleted.
    pub fn script_delete(&self, kind: ResourceKind, name: &str, script: ScriptedOperation) {
        self.state()
            .delete_scripts
            .insert(ResourceRef::new(kind, name), script);
    }

    /// Makes every `get` fail with a transport error.
    pub fn fail_lookups(&self, message: &str) {
        self.state().lookup_failure = Some(message.to_owned());
    }

    /// Finishes every outstanding operation as scripted, without polling.
    pub fn complete_all(&self) {
        let mut state = self.state();
        let ids: Vec<String> = state
            .operations
            .iter()
            .filter(|(_, pending)| pending.finished.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            state.finish(&id);
        }
    }

    /// Whether a resource is currently present.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.state()
            .resources
            .contains_key(&ResourceRef::new(kind, name))
    }

    /// Every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CloudCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: &CloudCall) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|recorded| *recorded == call)
            .count()
    }

    /// Total number of create requests.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, CloudCall::Create(_)))
            .count()
    }

    /// Number of polls issued for an operation.
    #[must_use]
    pub fn poll_calls(&self, operation_id: &str) -> usize {
        self.count(&CloudCall::Poll(operation_id.to_owned()))
    }

    /// Number of polls issued for every operation targeting a resource.
    #[must_use]
    pub fn polls_for(&self, kind: ResourceKind, name: &str) -> usize {
        let state = self.state();
        let target = ResourceRef::new(kind, name);
        state
            .calls
            .iter()
            .filter(|call| match call {
                CloudCall::Poll(id) => state
                    .operations
                    .get(id)
                    .is_some_and(|pending| pending.target == target),
                _ => false,
            })
            .count()
    }

    fn get_sync(&self, kind: ResourceKind, name: &str) -> Result<Option<Resource>, ClientError> {
        let mut state = self.state();
        state.calls.push(CloudCall::get(kind, name));
        if let Some(message) = &state.lookup_failure {
            return Err(ClientError::Transport {
                message: message.clone(),
            });
        }
        Ok(state.resources.get(&ResourceRef::new(kind, name)).cloned())
    }

    fn create_sync(&self, spec: &ResourceSpec) -> Result<Operation, ClientError> {
        let mut state = self.state();
        let target = spec.reference();
        state.calls.push(CloudCall::Create(target.clone()));

        if state.resources.contains_key(&target) {
            return Err(ClientError::AlreadyExists {
                kind: target.kind,
                name: target.name,
            });
        }

        let behaviour = state
            .create_scripts
            .get(&target)
            .cloned()
            .unwrap_or_else(|| CreateBehaviour::Operation(state.default_operation.clone()));
        match behaviour {
            CreateBehaviour::Reject(message) => Err(ClientError::Rejected {
                status: 400,
                message,
            }),
            CreateBehaviour::Conflict => Err(ClientError::AlreadyExists {
                kind: target.kind,
                name: target.name,
            }),
            CreateBehaviour::Operation(script) => {
                let resource = state.created_resource(spec);
                Ok(state.start_operation(target, script, Effect::Insert(resource)))
            }
        }
    }

    fn poll_sync(&self, operation: &Operation) -> Result<OperationState, ClientError> {
        let mut state = self.state();
        state.calls.push(CloudCall::Poll(operation.id.clone()));
        state
            .advance(&operation.id)
            .ok_or_else(|| ClientError::NotFound {
                kind: operation.target.kind,
                name: operation.id.clone(),
            })
    }

    fn list_sync(&self, kind: ResourceKind) -> Vec<Resource> {
        let mut state = self.state();
        state.calls.push(CloudCall::List(kind));
        state
            .resources
            .values()
            .filter(|resource| resource.kind == kind)
            .cloned()
            .collect()
    }

    fn delete_sync(&self, kind: ResourceKind, name: &str) -> Result<Operation, ClientError> {
        let mut state = self.state();
        let target = ResourceRef::new(kind, name);
        state.calls.push(CloudCall::Delete(target.clone()));
        if !state.resources.contains_key(&target) {
            return Err(ClientError::NotFound {
                kind,
                name: name.to_owned(),
            });
        }
        let script = state
            .delete_scripts
            .get(&target)
            .cloned()
            .unwrap_or_else(|| state.default_operation.clone());
        Ok(state.start_operation(target, script, Effect::Remove))
    }
}

impl CloudClient for FakeCloud {
    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Option<Resource>> {
        Box::pin(ready(self.get_sync(kind, name)))
    }

    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> ClientFuture<'a, Operation> {
        Box::pin(ready(self.create_sync(spec)))
    }

    fn poll_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, OperationState> {
        Box::pin(ready(self.poll_sync(operation)))
    }

    fn list(&self, kind: ResourceKind) -> ClientFuture<'_, Vec<Resource>> {
        Box::pin(ready(Ok(self.list_sync(kind))))
    }

    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Operation> {
        Box::pin(ready(self.delete_sync(kind, name)))
    }
}
