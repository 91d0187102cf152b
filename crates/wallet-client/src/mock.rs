//! Scripted EIP-1193 provider for tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::provider::{Eip1193Provider, ProviderEvent, RpcError};

#[derive(Clone)]
enum Scripted {
    Value(Value),
    Error(RpcError),
    Hang,
}

/// Provider that answers each method from a queue of canned responses.
///
/// The last queued response for a method is repeated once the queue runs
/// down to it. Unscripted methods fail with code -32601.
pub struct ScriptedProvider {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Value)>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    fn push(&self, method: &str, scripted: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.push(method, Scripted::Value(value));
    }

    pub fn fail(&self, method: &str, error: RpcError) {
        self.push(method, Scripted::Error(error));
    }

    /// Never answer this method
    pub fn hang(&self, method: &str) {
        self.push(method, Scripted::Hang);
    }

    /// Push a wallet notification to subscribers
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    /// Params of every request made to `method`, in order
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Method names in call order
    pub fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Eip1193Provider for ScriptedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let next = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(method) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match next {
            Some(Scripted::Value(v)) => Ok(v),
            Some(Scripted::Error(e)) => Err(e),
            Some(Scripted::Hang) => std::future::pending::<Result<Value, RpcError>>().await,
            None => Err(RpcError::new(-32601, format!("{} not scripted", method))),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
