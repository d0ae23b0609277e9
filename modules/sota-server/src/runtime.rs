//! Starts and stops the full interpreter loop for the SOTA domain.

use std::sync::Arc;

use sota_common::{Command, Event};
use sota_interpreter::{
    CommandHandle, CommandInterpreter, EngineConfig, EventInterpreter, GlobalHandle,
    GlobalInterpreter, InterpretError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::executor::SotaExecutor;
use crate::journal::EventJournal;
use crate::rules::SotaRules;
use crate::state::VehicleRegistry;

type LoopTask = JoinHandle<Result<(), InterpretError>>;

/// A running engine: dispatcher, command interpreter, event interpreter and
/// journal, wired into one closed loop.
pub struct Sota {
    global: GlobalHandle<Command, Event>,
    commands: CommandHandle<Command>,
    journal: Arc<EventJournal>,
    dispatcher: JoinHandle<Result<VehicleRegistry, InterpretError>>,
    command_task: LoopTask,
    event_task: LoopTask,
    journal_task: JoinHandle<()>,
}

impl Sota {
    pub async fn start(config: &EngineConfig) -> Result<Self, InterpretError> {
        Self::start_with(config, SotaExecutor::new(), VehicleRegistry::new()).await
    }

    pub async fn start_with(
        config: &EngineConfig,
        executor: SotaExecutor,
        state: VehicleRegistry,
    ) -> Result<Self, InterpretError> {
        let (global, handle) = GlobalInterpreter::new(executor, state, config);
        let dispatcher = global.spawn();

        let (command_interpreter, commands) =
            CommandInterpreter::new(handle.clone(), config.command_capacity);
        let command_task = command_interpreter.spawn();

        let rules_subscription = handle.subscribe_tracked().await?;
        let event_task = EventInterpreter::new(SotaRules, rules_subscription, commands.clone())
            .with_recovery(config.recover_rules)
            .spawn();

        let (journal, journal_task) = EventJournal::attach(&handle).await?;

        info!(
            queue_capacity = config.queue_capacity,
            submit_policy = %config.submit_policy,
            "SOTA interpreters running"
        );

        Ok(Self {
            global: handle,
            commands,
            journal,
            dispatcher,
            command_task,
            event_task,
            journal_task,
        })
    }

    /// Submit with a reply channel: the terminal event comes back.
    pub async fn interpret(&self, command: Command) -> Result<Event, InterpretError> {
        self.global.interpret(command).await
    }

    /// Fire-and-forget through the CommandInterpreter.
    pub async fn send(&self, command: Command) -> Result<(), InterpretError> {
        self.commands.send(command).await
    }

    pub fn global(&self) -> &GlobalHandle<Command, Event> {
        &self.global
    }

    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }

    /// Wait for the feedback loop to settle, close the dispatcher, let the
    /// shutdown cascade through the other loops, and hand back the final
    /// registry.
    ///
    /// Every command already accepted, and every follow-up command the rules
    /// derive from it, is executed before the queue closes.
    pub async fn shutdown(self) -> Result<VehicleRegistry, InterpretError> {
        let Sota {
            global,
            commands,
            journal,
            dispatcher,
            command_task,
            event_task,
            journal_task,
        } = self;

        global.wait_idle().await;
        debug!("Feedback loop idle, closing");
        global.close().await;
        drop(global);
        drop(commands);

        let state = dispatcher
            .await
            .map_err(|e| InterpretError::Fatal(format!("dispatcher task failed: {e}")))??;

        for (name, task) in [("event", event_task), ("command", command_task)] {
            match task.await {
                Ok(Ok(())) => debug!(interpreter = name, "Interpreter finished"),
                Ok(Err(InterpretError::Shutdown)) => {
                    debug!(interpreter = name, "Interpreter stopped after dispatcher shutdown")
                }
                Ok(Err(e)) => warn!(interpreter = name, error = %e, "Interpreter failed"),
                Err(e) => warn!(interpreter = name, error = %e, "Interpreter task panicked"),
            }
        }
        if let Err(e) = journal_task.await {
            warn!(error = %e, "Journal task panicked");
        }

        info!(
            vehicles = state.vehicle_count(),
            events = journal.len(),
            "SOTA interpreters stopped"
        );
        Ok(state)
    }
}
