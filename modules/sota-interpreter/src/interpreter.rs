//! The generic interpreter loop.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::InterpretError;
use crate::traits::{Inlet, Interpreter, Outlet};

/// Pull → interpret → forward, until the inlet closes.
///
/// Outputs are forwarded in the order the interpreter produced them. The loop
/// suspends while the inlet is empty. It returns `Ok` once the inlet is closed
/// and drained; an error from the interpreter or the outlet ends it early.
pub async fn run<I, O, T, In, Out>(
    interpreter: &mut T,
    inlet: &mut In,
    outlet: &mut Out,
) -> Result<(), InterpretError>
where
    I: Send + 'static,
    O: Send + 'static,
    T: Interpreter<I, O>,
    In: Inlet<I>,
    Out: Outlet<O>,
{
    while let Some(input) = inlet.next().await {
        let outputs = interpreter.interpret(input).await?;
        for output in outputs {
            outlet.forward(output).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl<T: Send> Inlet<T> for mpsc::Receiver<T> {
    async fn next(&mut self) -> Option<T> {
        self.recv().await
    }
}

#[async_trait]
impl<T: Send> Outlet<T> for mpsc::Sender<T> {
    async fn forward(&mut self, output: T) -> Result<(), InterpretError> {
        self.send(output).await.map_err(|_| InterpretError::Shutdown)
    }
}
