//! Bridge to the Julia solver runtime.
//!
//! This crate owns a persistent Julia process running a small driver, the
//! isolated project that process loads, and the translation between host
//! data and Julia programs.
//!
//! # Example
//!
//! ```no_run
//! use bridge::{Bridge, RuntimeLayout, RuntimeSettings, solvers};
//!
//! # async fn example() -> bridge::Result<()> {
//! let layout = RuntimeLayout::configure(&RuntimeSettings::default())?;
//! let bridge = Bridge::new(layout, bridge::DEFAULT_EXECUTABLE);
//!
//! bridge.ensure_ready().await?;
//! let packing = solvers::bin_packing(&bridge, &[5, 5, 5, 5], 10).await?;
//! println!("{} bins: {:?}", packing.num_bins, packing.bins);
//!
//! bridge.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod environment;
mod error;
pub mod ilp;
pub mod index;
pub mod program;
mod protocol;
mod runtime;
mod session;
pub mod solvers;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

pub use environment::{
    APP_NAMESPACE, EnvironmentManager, MIN_JULIA_VERSION, PROJECT_DIR, Package, PackageSource,
    REQUIRED_PACKAGES, RuntimeLayout, RuntimeSettings,
};
pub use error::{Error, Result};
pub use ilp::{IlpSolution, Mode, Sense, VarType, Variable};
pub use program::{Literal, Program, quote};
pub use protocol::MAX_RESPONSE_SIZE;
pub use runtime::Runtime;
pub use session::{DEFAULT_EXECUTABLE, JuliaSession, SessionConfig};

/// Process-wide handle to the prepared runtime.
///
/// The session is spawned and the environment bootstrapped on the first
/// [`Bridge::ensure_ready`] call. A session whose process has exited is
/// replaced by a fresh one on the next call. Share one `Bridge` across
/// conversations; as a [`Runtime`] it resolves the live session for every
/// program.
pub struct Bridge {
    layout: RuntimeLayout,
    executable: PathBuf,
    environment: EnvironmentManager,
    session: Mutex<Option<Arc<JuliaSession>>>,
}

impl Bridge {
    pub fn new(layout: RuntimeLayout, executable: impl Into<PathBuf>) -> Self {
        Self {
            environment: EnvironmentManager::new(&layout),
            layout,
            executable: executable.into(),
            session: Mutex::new(None),
        }
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    /// Start the session if needed and make sure the solver packages are
    /// installed and loaded.
    pub async fn ensure_ready(&self) -> Result<Arc<JuliaSession>> {
        let session = self.live_session().await?;
        self.environment.ensure_ready(session.as_ref()).await?;
        Ok(session)
    }

    /// The current session, spawning a replacement if the previous process
    /// is gone. Concurrent callers share one spawn.
    async fn live_session(&self) -> Result<Arc<JuliaSession>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            if session.is_running().await {
                return Ok(Arc::clone(session));
            }
            warn!("julia session exited, starting a new one");
        }
        let config = self.layout.session_config(&self.executable);
        let session = Arc::new(JuliaSession::spawn(config).await?);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The most recently started session, if [`Bridge::ensure_ready`] has
    /// started one. It may have exited since.
    pub async fn session(&self) -> Result<Arc<JuliaSession>> {
        self.session.lock().await.clone().ok_or(Error::NotStarted)
    }

    pub async fn is_ready(&self) -> bool {
        let session = self.session.lock().await.clone();
        match session {
            Some(session) => self.environment.is_ready() && session.is_running().await,
            None => false,
        }
    }

    /// Stop the Julia process. A bridge that never started is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let session = self.session.lock().await.clone();
        match session {
            Some(session) => session.shutdown().await,
            None => Ok(()),
        }
    }
}

impl Runtime for Bridge {
    async fn eval(&self, program: &Program) -> Result<Value> {
        self.ensure_ready().await?.eval(program).await
    }

    async fn threads(&self) -> Result<usize> {
        self.ensure_ready().await?.threads().await
    }
}
