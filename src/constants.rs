//! Shared constants for the LDN inbox.

/// Failure reason recorded when routing finds no processor
pub const NO_PROCESSOR_MATCHED: &str = "no processor matched";

/// Failure reason recorded when a processor overruns its time budget
pub const PROCESSOR_TIMEOUT: &str = "timeout";

/// Prefix for the failure reason recorded when retries run out
pub const RETRY_EXHAUSTED: &str = "retry attempts exhausted";

/// Media type for outbound notifications
pub const LDN_CONTENT_TYPE: &str = "application/ld+json";

/// JSON-LD contexts attached to outbound notifications
pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const COAR_NOTIFY_CONTEXT: &str = "https://purl.org/coar/notify";
