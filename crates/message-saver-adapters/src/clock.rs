use message_saver_core::{ClockPort, PortError};

#[derive(Debug, Clone, Default)]
pub struct SystemClockAdapter;

impl ClockPort for SystemClockAdapter {
    fn now_ms(&self) -> Result<u64, PortError> {
        // web_time maps to Date.now() on wasm and std::time elsewhere.
        let now = web_time::SystemTime::now()
            .duration_since(web_time::UNIX_EPOCH)
            .map_err(|e| PortError::Transport(format!("time error: {e}")))?;
        Ok(now.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_wall_clock_milliseconds() {
        let first = SystemClockAdapter.now_ms().expect("now");
        let second = SystemClockAdapter.now_ms().expect("now");
        // 2024-01-01T00:00:00Z
        assert!(first > 1_704_067_200_000);
        assert!(second >= first);
    }
}
