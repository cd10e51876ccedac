//! Bridge from synchronous callers to the async unit of work

use std::future::Future;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};

use crate::error::{Error, Result};

/// Runs async operations to completion on behalf of blocking callers
///
/// Remembers the multi-thread runtime the unit of work was created on, so
/// engine resources tied to that runtime keep being driven by it.
#[derive(Debug, Clone)]
pub(crate) struct BlockingBridge {
    home: Option<Handle>,
}

impl BlockingBridge {
    pub(crate) fn capture() -> Self {
        let home = Handle::try_current()
            .ok()
            .filter(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
        Self { home }
    }

    pub(crate) fn run<F: Future>(&self, operation: &str, future: F) -> Result<F::Output> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            Ok(_) => Err(Error::InvalidOperation(format!(
                "cannot {} synchronously on a current-thread runtime; use the async variant",
                operation
            ))),
            Err(_) => match &self.home {
                Some(home) => Ok(home.block_on(future)),
                None => {
                    let runtime = Builder::new_current_thread().enable_all().build()?;
                    Ok(runtime.block_on(future))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_without_runtime() {
        let bridge = BlockingBridge::capture();
        let value = bridge.run("add", async { 1 + 1 }).unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_refuses_current_thread_runtime() {
        let bridge = BlockingBridge::capture();
        let err = bridge.run("save changes", async {}).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocks_in_place_on_multi_thread_runtime() {
        let bridge = BlockingBridge::capture();
        let value = bridge
            .run("sleep", async {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                7
            })
            .unwrap();
        assert_eq!(value, 7);
    }
}
