/// Operator confirmation for destructive steps.
///
/// The CLI supplies an interactive implementation; `--yes` and tests use
/// [`AssumeYes`] / [`AssumeNo`].
pub trait Confirm {
    fn confirm(&self, prompt: &str, default: bool) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str, _default: bool) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&self, _prompt: &str, _default: bool) -> bool {
        false
    }
}

impl<F> Confirm for F
where
    F: Fn(&str, bool) -> bool,
{
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        self(prompt, default)
    }
}
