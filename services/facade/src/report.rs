//! Error rendering for responses and logs.

use std::error::Error;

/// Render an error followed by every distinct message in its source chain,
/// joined with `": "`.
///
/// Client libraries such as reqwest keep the actual cause (connection
/// refused, DNS failure, timeout) in a nested source and leave it out of
/// their top-level message. Sources whose message is already part of the
/// rendered text are skipped.
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !message.is_empty() && !rendered.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("outer failed: {0}")]
    struct Outer(#[source] Middle);

    #[derive(Debug, Error)]
    #[error("middle failed")]
    struct Middle(#[source] std::io::Error);

    #[test]
    fn test_chain_appends_hidden_causes_once() {
        let err = Outer(Middle(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused (os error 111)",
        )));

        assert_eq!(
            error_chain(&err),
            "outer failed: middle failed: Connection refused (os error 111)"
        );
    }

    #[test]
    fn test_chain_without_sources() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(error_chain(&err), "boom");
    }
}
