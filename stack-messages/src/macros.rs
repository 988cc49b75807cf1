/// Build a message from a template with named substitutions.
///
/// ```
/// use stack_messages::{msg, MESSAGES};
/// let line = msg!(MESSAGES.service_starting, service = "backend");
/// assert!(line.contains("backend"));
/// ```
#[macro_export]
macro_rules! msg {
    ($template:expr) => {
        $crate::builder::MessageBuilder::new($template).build()
    };
    ($template:expr, $($key:ident = $value:expr),+ $(,)?) => {
        {
            let mut builder = $crate::builder::MessageBuilder::new($template);
            $(
                builder = builder.var(stringify!($key), $value);
            )+
            builder.build()
        }
    };
}
