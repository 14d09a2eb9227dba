//! The seam between solver code and whatever evaluates Julia programs.

use std::future::Future;

use serde_json::Value;

use crate::error::Result;
use crate::program::Program;

/// Something that can evaluate a synthesized program and hand back its value
/// as JSON.
///
/// [`JuliaSession`](crate::JuliaSession) is the production implementation.
/// Implementations are not required to be reentrant; callers that share one
/// across tasks rely on the implementation to serialize access.
pub trait Runtime: Send + Sync {
    /// Evaluate `program` and return the value of its final statement.
    fn eval(&self, program: &Program) -> impl Future<Output = Result<Value>> + Send;

    /// Number of threads the runtime computes with.
    fn threads(&self) -> impl Future<Output = Result<usize>> + Send {
        async move {
            let value = self.eval(&Program::new().stmt("Threads.nthreads()")).await?;
            Ok(serde_json::from_value(value)?)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;

    type Handler = Box<dyn Fn(&str) -> Result<Value> + Send + Sync>;

    /// Answers programs with a closure and records every source it saw.
    pub(crate) struct ScriptedRuntime {
        handler: Handler,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedRuntime {
        pub(crate) fn new(handler: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn returning(value: Value) -> Self {
            Self::new(move |_| Ok(value.clone()))
        }

        pub(crate) fn failing(message: &'static str) -> Self {
            Self::new(move |_| Err(Error::Eval(message.into())))
        }

        pub(crate) fn programs(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Runtime for ScriptedRuntime {
        /// Yields before answering so concurrent callers interleave.
        async fn eval(&self, program: &Program) -> Result<Value> {
            let source = program.source();
            self.seen.lock().unwrap().push(source.clone());
            tokio::task::yield_now().await;
            (self.handler)(&source)
        }
    }
}
