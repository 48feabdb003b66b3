use tokio_util::sync::CancellationToken;

/// Cancellation signal handed to an endpoint call.
///
/// Honoring it is best-effort: once the signal fires, the handler discards
/// whatever the call eventually returns.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the request is aborted or superseded.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}
