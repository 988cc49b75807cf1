use dialoguer::Confirm as ConfirmPrompt;
use stack_orchestrator::Confirm;
use tracing::warn;

/// Terminal confirmation. Without a terminal the prompt fails and the
/// answer is "no".
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        match ConfirmPrompt::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation prompt failed: {}", e);
                false
            }
        }
    }
}
