use std::any::Any;

/// Renders causes as an indented bullet list, one per line.
pub(crate) fn bullet_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| format!("\n\t- {}", item.as_ref()))
        .collect()
}

/// Attempts to turn a panic payload into a readable string for diagnostics.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic.downcast::<&'static str>().map_or_else(
                |_| "unknown panic".to_owned(),
                |message| (*message).to_owned(),
            )
        },
        |message| *message,
    )
}
