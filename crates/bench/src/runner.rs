//! The seam between the scheduler and the browser harness.
//!
//! Workers drive cases through a `CaseRunner`; production uses a
//! `PageController` per engine, tests substitute a scripted runner so the
//! scheduling and classification logic can be exercised without a browser.

use async_trait::async_trait;

use xssbench_harness::{Engine, HarnessError, PageController, PreparedCase, Signals};

/// Runs prepared cases against one browser engine.
#[async_trait]
pub trait CaseRunner: Send {
    fn engine_version(&self) -> String;

    async fn run(
        &mut self,
        case: &PreparedCase,
        timeout_ms: Option<u64>,
    ) -> Result<Signals, HarnessError>;

    /// Collect whatever signals exist after the per-case wall clock expired.
    async fn abort(&mut self) -> Signals;

    /// Discard page state after an `error` outcome or a refresh interval.
    async fn recycle(&mut self) -> Result<(), HarnessError>;
}

/// Creates one `CaseRunner` per (worker, engine).
#[async_trait]
pub trait RunnerFactory: Send + Sync {
    async fn create(&self, engine: Engine) -> Result<Box<dyn CaseRunner>, HarnessError>;
}

struct BrowserRunner {
    controller: PageController,
}

#[async_trait]
impl CaseRunner for BrowserRunner {
    fn engine_version(&self) -> String {
        self.controller.engine_version().to_string()
    }

    async fn run(
        &mut self,
        case: &PreparedCase,
        timeout_ms: Option<u64>,
    ) -> Result<Signals, HarnessError> {
        if self.controller.needs_refresh() {
            self.controller.recycle_page().await?;
        }
        self.controller.run_case(case, timeout_ms).await
    }

    async fn abort(&mut self) -> Signals {
        self.controller.abort_case().await
    }

    async fn recycle(&mut self) -> Result<(), HarnessError> {
        self.controller.recycle_page().await
    }
}

/// Production factory: one browser process per (worker, engine).
pub struct BrowserRunnerFactory;

#[async_trait]
impl RunnerFactory for BrowserRunnerFactory {
    async fn create(&self, engine: Engine) -> Result<Box<dyn CaseRunner>, HarnessError> {
        let controller = PageController::new(engine).await?;
        Ok(Box::new(BrowserRunner { controller }))
    }
}
