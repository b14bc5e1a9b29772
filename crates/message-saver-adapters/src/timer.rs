use async_trait::async_trait;

use message_saver_core::TimerPort;

/// Sleeps on the host runtime: tokio natively, `setTimeout` in the browser.
#[derive(Debug, Clone, Default)]
pub struct RuntimeTimer;

#[async_trait(?Send)]
impl TimerPort for RuntimeTimer {
    async fn sleep_ms(&self, ms: u64) {
        #[cfg(not(target_arch = "wasm32"))]
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;

        #[cfg(target_arch = "wasm32")]
        if let Err(e) = browser_sleep(ms).await {
            tracing::warn!("setTimeout sleep failed: {e}");
        }
    }
}

#[cfg(target_arch = "wasm32")]
async fn browser_sleep(ms: u64) -> Result<(), message_saver_core::PortError> {
    use message_saver_core::PortError;

    let window = crate::browser::window()?;
    let timeout = i32::try_from(ms).unwrap_or(i32::MAX);
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        if let Err(e) =
            window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
        {
            tracing::warn!("setTimeout failed: {e:?}");
        }
    });
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map(|_| ())
        .map_err(|e| PortError::Transport(format!("timer rejected: {e:?}")))
}
