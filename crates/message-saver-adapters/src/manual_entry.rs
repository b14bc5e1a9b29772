use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use message_saver_core::ManualEntryPort;

/// Where a manually typed account id comes from.
#[derive(Debug, Clone)]
pub enum ManualEntryAdapter {
    /// Never prompts; the cascade moves on.
    Disabled,
    /// Answers prompts from a script, then dismisses.
    Scripted(Arc<Mutex<VecDeque<Option<String>>>>),
    /// Reads one line from stdin.
    #[cfg(not(target_arch = "wasm32"))]
    Console,
    /// `window.prompt`.
    #[cfg(target_arch = "wasm32")]
    BrowserPrompt,
}

impl ManualEntryAdapter {
    pub fn scripted<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        ManualEntryAdapter::Scripted(Arc::new(Mutex::new(answers.into_iter().collect())))
    }

    /// Prompts served so far from a script, or `None` for other modes.
    pub fn remaining_answers(&self) -> Option<usize> {
        match self {
            ManualEntryAdapter::Scripted(answers) => answers.lock().ok().map(|a| a.len()),
            _ => None,
        }
    }
}

#[async_trait(?Send)]
impl ManualEntryPort for ManualEntryAdapter {
    async fn request_account_id(&self, prompt: &str) -> Option<String> {
        match self {
            ManualEntryAdapter::Disabled => None,
            ManualEntryAdapter::Scripted(answers) => match answers.lock() {
                Ok(mut answers) => answers.pop_front().flatten(),
                Err(e) => {
                    warn!("manual entry script lock poisoned: {e}");
                    None
                }
            },
            #[cfg(not(target_arch = "wasm32"))]
            ManualEntryAdapter::Console => {
                use std::io::{BufRead, Write};

                info!("waiting for manual account id on stdin");
                let mut stdout = std::io::stdout();
                if writeln!(stdout, "{prompt}").and_then(|_| stdout.flush()).is_err() {
                    return None;
                }
                let mut line = String::new();
                match std::io::stdin().lock().read_line(&mut line) {
                    Ok(0) => None,
                    Ok(_) => Some(line.trim().to_owned()).filter(|l| !l.is_empty()),
                    Err(e) => {
                        warn!("reading manual account id failed: {e}");
                        None
                    }
                }
            }
            #[cfg(target_arch = "wasm32")]
            ManualEntryAdapter::BrowserPrompt => {
                info!("prompting for manual account id");
                let window = crate::browser::window().ok()?;
                window.prompt_with_message(prompt).ok().flatten()
            }
        }
    }
}
