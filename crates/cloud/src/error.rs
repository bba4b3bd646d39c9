/// Errors from the compute gateway layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The provider API call failed (network, throttling, auth, etc.).
    #[error("Cloud API error ({operation}): {message}")]
    Api {
        /// Provider operation that failed, e.g. `DescribeInstances`.
        operation: &'static str,
        /// Provider error code and message.
        message: String,
    },

    /// The provider answered, but without the data we asked for.
    #[error("Unexpected cloud response ({operation}): {message}")]
    UnexpectedResponse {
        operation: &'static str,
        message: String,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;
