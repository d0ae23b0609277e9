//! Integration tests for the closed loop:
//! GlobalInterpreter → EventInterpreter → CommandInterpreter → GlobalInterpreter.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sota_interpreter::{
    CommandHandle, CommandInterpreter, CommandLike, EngineConfig, EventInterpreter, EventLike,
    EventRules, ExecuteError, Executor, GlobalInterpreter, InterpretError, Subscription,
};

// ---------------------------------------------------------------------------
// Test command / event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TestCommand {
    Work { n: u32 },
    Follow { n: u32, step: u32 },
    Explode,
}

impl CommandLike for TestCommand {
    fn command_type(&self) -> &'static str {
        match self {
            TestCommand::Work { .. } => "work",
            TestCommand::Follow { .. } => "follow",
            TestCommand::Explode => "explode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TestEvent {
    Started { n: u32 },
    Done { n: u32 },
    Recorded { n: u32, step: u32 },
    Exploded,
    Failed { reason: String },
}

impl EventLike for TestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TestEvent::Started { .. } => "started",
            TestEvent::Done { .. } => "done",
            TestEvent::Recorded { .. } => "recorded",
            TestEvent::Exploded => "exploded",
            TestEvent::Failed { .. } => "failed",
        }
    }
}

struct TestExecutor;

#[async_trait]
impl Executor<TestCommand, TestEvent, ()> for TestExecutor {
    async fn execute(
        &self,
        command: &TestCommand,
        _state: &mut (),
    ) -> Result<Vec<TestEvent>, ExecuteError> {
        Ok(match command {
            TestCommand::Work { n } => vec![TestEvent::Started { n: *n }, TestEvent::Done { n: *n }],
            TestCommand::Follow { n, step } => vec![TestEvent::Recorded { n: *n, step: *step }],
            TestCommand::Explode => vec![TestEvent::Exploded],
        })
    }

    fn failed(&self, _command: &TestCommand, reason: String) -> TestEvent {
        TestEvent::Failed { reason }
    }
}

// ---------------------------------------------------------------------------
// Rules: Done → [Follow 1, Follow 2]; Exploded → error
// ---------------------------------------------------------------------------

struct TestRules;

#[async_trait]
impl EventRules<TestEvent, TestCommand> for TestRules {
    async fn derive(&self, event: &TestEvent) -> Result<Vec<TestCommand>> {
        match event {
            TestEvent::Done { n } => Ok(vec![
                TestCommand::Follow { n: *n, step: 1 },
                TestCommand::Follow { n: *n, step: 2 },
            ]),
            TestEvent::Exploded => bail!("cannot handle explosions"),
            TestEvent::Started { .. } | TestEvent::Recorded { .. } | TestEvent::Failed { .. } => {
                Ok(vec![])
            }
        }
    }
}

async fn recv_within<T>(rx: &mut tokio::sync::mpsc::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

async fn next_event(sub: &mut Subscription<TestEvent>) -> TestEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("timed out")
        .expect("subscription closed")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn derived_commands_reach_command_input_in_rule_order() {
    let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &EngineConfig::default());
    let _dispatcher = global.spawn();

    let (commands, mut command_rx) = CommandHandle::channel(16);
    let sub = handle.subscribe().await.unwrap();
    let _events = EventInterpreter::new(TestRules, sub, commands).spawn();

    handle.interpret(TestCommand::Work { n: 1 }).await.unwrap();
    handle.interpret(TestCommand::Work { n: 2 }).await.unwrap();

    assert_eq!(recv_within(&mut command_rx).await, TestCommand::Follow { n: 1, step: 1 });
    assert_eq!(recv_within(&mut command_rx).await, TestCommand::Follow { n: 1, step: 2 });
    assert_eq!(recv_within(&mut command_rx).await, TestCommand::Follow { n: 2, step: 1 });
    assert_eq!(recv_within(&mut command_rx).await, TestCommand::Follow { n: 2, step: 2 });
}

#[tokio::test]
async fn full_loop_feeds_derived_commands_back_into_the_dispatcher() {
    let config = EngineConfig::default();
    let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &config);
    let dispatcher = global.spawn();

    let (command_interpreter, commands) =
        CommandInterpreter::new(handle.clone(), config.command_capacity);
    let command_task = command_interpreter.spawn();

    let rules_sub = handle.subscribe().await.unwrap();
    let event_task = EventInterpreter::new(TestRules, rules_sub, commands.clone()).spawn();

    let mut observer = handle.subscribe().await.unwrap();
    handle.interpret(TestCommand::Work { n: 7 }).await.unwrap();

    assert_eq!(next_event(&mut observer).await, TestEvent::Started { n: 7 });
    assert_eq!(next_event(&mut observer).await, TestEvent::Done { n: 7 });
    assert_eq!(next_event(&mut observer).await, TestEvent::Recorded { n: 7, step: 1 });
    assert_eq!(next_event(&mut observer).await, TestEvent::Recorded { n: 7, step: 2 });

    // Fire-and-forget submissions go through the same loop.
    commands.send(TestCommand::Follow { n: 8, step: 9 }).await.unwrap();
    assert_eq!(next_event(&mut observer).await, TestEvent::Recorded { n: 8, step: 9 });

    // Shutdown cascades: dispatcher → event interpreter → command interpreter.
    handle.close().await;
    dispatcher.await.unwrap().unwrap();
    event_task.await.unwrap().unwrap();
    drop(commands);
    command_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rule_error_stops_event_interpreter_without_recovery() {
    let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &EngineConfig::default());
    let _dispatcher = global.spawn();

    let (commands, _command_rx) = CommandHandle::channel(16);
    let sub = handle.subscribe().await.unwrap();
    let event_task = EventInterpreter::new(TestRules, sub, commands).spawn();

    handle.interpret(TestCommand::Explode).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), event_task)
        .await
        .expect("event interpreter kept running")
        .unwrap();
    assert!(matches!(result, Err(InterpretError::Fatal(_))));

    // The dispatcher is unaffected.
    let done = handle.interpret(TestCommand::Work { n: 1 }).await.unwrap();
    assert_eq!(done, TestEvent::Done { n: 1 });
}

#[tokio::test]
async fn rule_error_is_skipped_with_recovery() {
    let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &EngineConfig::default());
    let _dispatcher = global.spawn();

    let (commands, mut command_rx) = CommandHandle::channel(16);
    let sub = handle.subscribe().await.unwrap();
    let _events = EventInterpreter::new(TestRules, sub, commands)
        .with_recovery(true)
        .spawn();

    handle.interpret(TestCommand::Explode).await.unwrap();
    handle.interpret(TestCommand::Work { n: 3 }).await.unwrap();

    assert_eq!(recv_within(&mut command_rx).await, TestCommand::Follow { n: 3, step: 1 });
}

#[tokio::test]
async fn command_interpreter_reports_shutdown_when_dispatcher_is_gone() {
    let config = EngineConfig::default();
    let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &config);
    let dispatcher = global.spawn();

    let (command_interpreter, commands) = CommandInterpreter::new(handle.clone(), 4);
    let command_task = command_interpreter.spawn();

    handle.close().await;
    dispatcher.await.unwrap().unwrap();

    commands.send(TestCommand::Work { n: 1 }).await.unwrap();
    let result = command_task.await.unwrap();
    assert_eq!(result, Err(InterpretError::Shutdown));

    // The rejected command no longer counts as in flight.
    assert!(handle.in_flight().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wait_idle_lets_derived_commands_finish_before_close() {
    for n in 0..50 {
        let config = EngineConfig::default();
        let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &config);
        let dispatcher = global.spawn();

        let (command_interpreter, commands) =
            CommandInterpreter::new(handle.clone(), config.command_capacity);
        let command_task = command_interpreter.spawn();

        let rules_sub = handle.subscribe_tracked().await.unwrap();
        assert!(rules_sub.is_tracked());
        let event_task = EventInterpreter::new(TestRules, rules_sub, commands).spawn();

        let mut observer = handle.subscribe().await.unwrap();
        handle.interpret(TestCommand::Work { n }).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.wait_idle())
            .await
            .expect("feedback loop never settled");
        handle.close().await;
        dispatcher.await.unwrap().unwrap();
        event_task.await.unwrap().unwrap();
        command_task.await.unwrap().unwrap();

        let mut recorded = Vec::new();
        while let Some(event) = observer.recv().await {
            if let TestEvent::Recorded { step, .. } = event {
                recorded.push(step);
            }
        }
        assert_eq!(recorded, vec![1, 2], "round {n} lost follow-up work");
        assert!(handle.in_flight().is_idle());
    }
}

#[tokio::test]
async fn fire_and_forget_commands_count_until_dispatched() {
    let config = EngineConfig::default();
    let (global, handle) = GlobalInterpreter::new(TestExecutor, (), &config);

    let (command_interpreter, commands) = CommandInterpreter::new(handle.clone(), 4);
    commands.send(TestCommand::Follow { n: 1, step: 1 }).await.unwrap();
    assert_eq!(handle.in_flight().count(), 1);

    // Nothing runs yet, so the loop is not idle.
    let not_idle = tokio::time::timeout(Duration::from_millis(50), handle.wait_idle()).await;
    assert!(not_idle.is_err());

    let dispatcher = global.spawn();
    let _command_task = command_interpreter.spawn();
    tokio::time::timeout(Duration::from_secs(5), handle.wait_idle())
        .await
        .expect("command was never dispatched");

    handle.close().await;
    dispatcher.await.unwrap().unwrap();
}
