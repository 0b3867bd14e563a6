use crate::{
    event::{Event, SystemBusTx},
    runtime::{RuntimeCommand, RuntimeEvent, RuntimeId},
};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use vela_execution::client::ExecutionClient;
use vela_risk::kill_switch::{KillSwitch, KillSwitchReason, ResetTokenRejected};

/// Unique identifier of a live session (one venue connection pair).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId(pub SmolStr);

impl SessionId {
    pub fn new<S: Into<SmolStr>>(id: S) -> Self {
        Self(id.into())
    }
}

/// Handle to a registered strategy runtime task.
#[derive(Debug)]
pub struct RuntimeHandle {
    pub tx: mpsc::UnboundedSender<RuntimeEvent>,
    pub paused: bool,
}

/// Handle to a registered live session.
pub struct SessionHandle {
    /// Cancellation signal consumed by the session's adapter tasks.
    pub shutdown: tokio::sync::watch::Sender<bool>,
    /// Execution client used for kill-switch cancel-all.
    pub execution: Arc<dyn ExecutionClient>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate view over the registries.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct EngineSummary {
    pub runtimes: usize,
    pub paused_runtimes: usize,
    pub sessions: usize,
    pub kill_switch_active: bool,
}

/// Registry and lifecycle coordinator for strategy runtimes and live
/// sessions.
///
/// Owns the process-wide kill switch: tripping it cancels open orders on
/// every session's execution client, halts every registered runtime, and
/// publishes the activation event.
#[derive(Debug)]
pub struct EngineManager {
    runtimes: IndexMap<RuntimeId, RuntimeHandle>,
    sessions: IndexMap<SessionId, SessionHandle>,
    kill_switch: Arc<KillSwitch>,
    bus_tx: SystemBusTx,
}

impl EngineManager {
    pub fn new(kill_switch: Arc<KillSwitch>, bus_tx: SystemBusTx) -> Self {
        Self {
            runtimes: IndexMap::new(),
            sessions: IndexMap::new(),
            kill_switch,
            bus_tx,
        }
    }

    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.kill_switch
    }

    /// Register a runtime's command channel under a unique id.
    pub fn register_runtime(&mut self, id: RuntimeId, tx: mpsc::UnboundedSender<RuntimeEvent>) {
        if self
            .runtimes
            .insert(id.clone(), RuntimeHandle { tx, paused: false })
            .is_some()
        {
            warn!(?id, "replaced an existing runtime registration");
        }
    }

    /// Register a live session's shutdown signal and execution client.
    pub fn register_session(
        &mut self,
        id: SessionId,
        shutdown: tokio::sync::watch::Sender<bool>,
        execution: Arc<dyn ExecutionClient>,
    ) {
        if self
            .sessions
            .insert(id.clone(), SessionHandle { shutdown, execution })
            .is_some()
        {
            warn!(%id, "replaced an existing session registration");
        }
    }

    pub fn runtime_ids(&self) -> impl Iterator<Item = &RuntimeId> + '_ {
        self.runtimes.keys()
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            runtimes: self.runtimes.len(),
            paused_runtimes: self.runtimes.values().filter(|handle| handle.paused).count(),
            sessions: self.sessions.len(),
            kill_switch_active: self.kill_switch.is_active(),
        }
    }

    /// Pause one runtime (market events are still delivered; the runtime
    /// stops acting on them).
    pub fn pause(&mut self, id: &RuntimeId) -> Result<(), crate::VelaError> {
        self.command(id, RuntimeCommand::Pause)?;
        if let Some(handle) = self.runtimes.get_mut(id) {
            handle.paused = true;
        }
        Ok(())
    }

    pub fn resume(&mut self, id: &RuntimeId) -> Result<(), crate::VelaError> {
        self.command(id, RuntimeCommand::Resume)?;
        if let Some(handle) = self.runtimes.get_mut(id) {
            handle.paused = false;
        }
        Ok(())
    }

    /// Stop and deregister one runtime.
    pub fn stop(&mut self, id: &RuntimeId) -> Result<(), crate::VelaError> {
        self.command(id, RuntimeCommand::Stop)?;
        self.runtimes.shift_remove(id);
        Ok(())
    }

    /// Stop every session's adapters and every runtime.
    pub fn shutdown_all(&mut self) {
        for (id, session) in &self.sessions {
            if session.shutdown.send(true).is_err() {
                warn!(%id, "session already gone at shutdown");
            }
        }
        let ids: Vec<RuntimeId> = self.runtimes.keys().cloned().collect();
        for id in ids {
            let _stopped = self.stop(&id);
        }
        let _send = self.bus_tx.publish(
            crate::event::topics::SYSTEM_SHUTDOWN,
            Event::Shutdown { time: Utc::now() },
        );
    }

    /// Trip the process-wide kill switch: refuse further submissions, cancel
    /// open orders everywhere, halt every runtime and publish the event.
    ///
    /// The atomic flag is set first, so concurrent `check_order` callers
    /// observe the halt before their next check returns.
    pub async fn trip_kill_switch(&mut self, reason: KillSwitchReason) {
        let now = Utc::now();
        if !self.kill_switch.activate(reason.clone(), now) {
            return;
        }
        info!(%reason, "kill switch tripped, halting fleet");

        let _send = self.bus_tx.publish(
            crate::event::topics::SYSTEM_KILL_SWITCH,
            Event::KillSwitchActivated {
                reason: reason.to_string(),
                time: now,
            },
        );

        for handle in self.runtimes.values_mut() {
            if handle.tx.send(RuntimeEvent::Command(RuntimeCommand::Halt)).is_err() {
                warn!("runtime channel closed during kill-switch halt");
            }
        }

        for (id, session) in &self.sessions {
            match session.execution.cancel_all().await {
                Ok(cancelled) => info!(%id, cancelled, "open orders cancelled"),
                Err(error) => warn!(%id, %error, "cancel-all failed during kill switch"),
            }
        }
    }

    /// Re-enable trading with the operator token.
    pub fn reset_kill_switch(&self, token: &str) -> Result<(), ResetTokenRejected> {
        self.kill_switch.reset(token)
    }

    fn command(&self, id: &RuntimeId, command: RuntimeCommand) -> Result<(), crate::VelaError> {
        let handle = self
            .runtimes
            .get(id)
            .ok_or_else(|| crate::VelaError::UnknownEntity(format!("runtime {:?}", id.0)))?;
        handle
            .tx
            .send(RuntimeEvent::Command(command))
            .map_err(|_| crate::VelaError::UnknownEntity(format!("runtime {:?} closed", id.0)))
    }
}
