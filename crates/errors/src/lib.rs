use std::borrow::Cow;

use ::metrics::{
    metric_tag_const,
    metric_tag_const_value,
    MetricTag,
};
use prometheus::IntCounter;

mod metrics;

/// ErrorMetadata can be attached to an anyhow error chain via
/// `.context(e /* ErrorMetadata */)`. It classifies an error into one of a
/// small, closed set of kinds so that storage retries, handler status-code
/// mapping, and triage-response reconciliation can all key off the same
/// classification instead of string-matching on messages.
///
/// `msg` is shown to callers; `short_msg` is a ScreamingCamelCase tag stable
/// across copy changes, usable in tests and metrics.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{msg}")]
pub struct ErrorMetadata {
    pub code: ErrorCode,
    pub short_msg: Cow<'static, str>,
    pub msg: Cow<'static, str>,
}

#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The requested grouping/digest/record/rule/commit does not exist.
    NotFound,
    /// A triage write lost a race: the label it expected to replace no
    /// longer matches what's stored.
    Conflict,
    /// The caller asked for something that can never succeed: an empty
    /// ignore filter, a negative duration, an unknown undo id.
    Precondition,
    /// The backend hiccuped; the same call is expected to succeed on retry.
    Transient,
    /// The caller isn't authenticated/authorized for a triage mutation.
    PermissionDenied,
    /// Unrecoverable misconfiguration, e.g. an empty public-view allowlist.
    Fatal,
}

impl ErrorMetadata {
    pub fn not_found(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::NotFound,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// A triage write raced with another write to the same
    /// `(grouping, digest)`. The caller should re-read and decide whether to
    /// retry; the conflict response carries the server's observed
    /// `label_before` so the client can reconcile.
    pub fn conflict(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Conflict,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn precondition(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Precondition,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// A storage or RPC error that's expected to be transient. Callers in
    /// the core (stores, indexer) retry these with backoff; they should
    /// never be surfaced directly to an end user.
    pub fn transient(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Transient,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn permission_denied(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::PermissionDenied,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn fatal(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Fatal,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.code == ErrorCode::Conflict
    }

    pub fn is_precondition(&self) -> bool {
        self.code == ErrorCode::Precondition
    }

    pub fn is_transient(&self) -> bool {
        self.code == ErrorCode::Transient
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code == ErrorCode::PermissionDenied
    }

    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::Fatal
    }

    /// Whether a caller may safely retry the operation that produced this
    /// error without first changing anything about the request.
    pub fn is_retriable(&self) -> bool {
        matches!(self.code, ErrorCode::Transient)
    }

    fn metric_error_tag_value(&self) -> &'static str {
        match self.code {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Precondition => "precondition",
            ErrorCode::Transient => "transient",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::Fatal => "fatal",
        }
    }

    pub fn metric_error_tag(&self) -> MetricTag {
        metric_tag_const_value("type", self.metric_error_tag_value())
    }

    pub fn custom_metric(&self) -> Option<&'static IntCounter> {
        match self.code {
            ErrorCode::NotFound => Some(&crate::metrics::NOT_FOUND_ERROR_TOTAL),
            ErrorCode::Conflict => Some(&crate::metrics::TRIAGE_CONFLICT_TOTAL),
            ErrorCode::Precondition => Some(&crate::metrics::PRECONDITION_ERROR_TOTAL),
            ErrorCode::Transient => Some(&crate::metrics::TRANSIENT_ERROR_TOTAL),
            ErrorCode::PermissionDenied => Some(&crate::metrics::PERMISSION_DENIED_ERROR_TOTAL),
            ErrorCode::Fatal => Some(&crate::metrics::FATAL_ERROR_TOTAL),
        }
    }
}

/// HTTP status this kind maps to for the (out-of-scope) JSON façade. Kept
/// here rather than in the façade since it's part of the error kind's public
/// contract, not routing logic.
impl ErrorCode {
    pub fn http_status_code(&self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::Precondition => 400,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::Transient | ErrorCode::Fatal => 500,
        }
    }
}

pub trait ErrorMetadataAnyhowExt {
    fn is_not_found(&self) -> bool;
    fn is_conflict(&self) -> bool;
    fn is_precondition(&self) -> bool;
    fn is_transient(&self) -> bool;
    fn is_permission_denied(&self) -> bool;
    fn is_fatal(&self) -> bool;
    fn is_retriable(&self) -> bool;
    fn user_facing_message(&self) -> String;
    fn short_msg(&self) -> &str;
    fn msg(&self) -> &str;
    fn metric_error_tag(&self) -> Option<MetricTag>;
    fn http_status_code(&self) -> u16;
    fn map_error_metadata<F: FnOnce(ErrorMetadata) -> ErrorMetadata>(self, f: F) -> Self;
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    fn is_not_found(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_not_found)
    }

    fn is_conflict(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_conflict)
    }

    fn is_precondition(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_precondition)
    }

    fn is_transient(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_transient)
    }

    fn is_permission_denied(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_permission_denied)
    }

    fn is_fatal(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_fatal)
    }

    /// An error with no `ErrorMetadata` at all (a bare anyhow chain from some
    /// library) is treated as transient: we don't know what it is, and
    /// storage call sites default to retrying unclassified backend errors.
    fn is_retriable(&self) -> bool {
        match self.downcast_ref::<ErrorMetadata>() {
            Some(e) => e.is_retriable(),
            None => true,
        }
    }

    fn user_facing_message(&self) -> String {
        match self.downcast_ref::<ErrorMetadata>() {
            Some(e) => e.to_string(),
            None => INTERNAL_SERVER_ERROR_MSG.to_string(),
        }
    }

    fn short_msg(&self) -> &str {
        match self.downcast_ref::<ErrorMetadata>() {
            Some(e) => &e.short_msg,
            None => INTERNAL_SERVER_ERROR,
        }
    }

    fn msg(&self) -> &str {
        match self.downcast_ref::<ErrorMetadata>() {
            Some(e) => &e.msg,
            None => INTERNAL_SERVER_ERROR_MSG,
        }
    }

    fn metric_error_tag(&self) -> Option<MetricTag> {
        match self.downcast_ref::<ErrorMetadata>() {
            Some(e) => Some(e.metric_error_tag()),
            None => Some(metric_tag_const("type:internal")),
        }
    }

    fn http_status_code(&self) -> u16 {
        match self.downcast_ref::<ErrorMetadata>() {
            Some(e) => e.code.http_status_code(),
            None => 500,
        }
    }

    fn map_error_metadata<F>(self, f: F) -> Self
    where
        F: FnOnce(ErrorMetadata) -> ErrorMetadata,
    {
        match self.downcast_ref::<ErrorMetadata>().cloned() {
            Some(e) => self.context(f(e)),
            None => self,
        }
    }
}

pub const INTERNAL_SERVER_ERROR_MSG: &str = "Your request couldn't be completed. Try again later.";
pub const INTERNAL_SERVER_ERROR: &str = "InternalServerError";

#[cfg(any(test, feature = "testing"))]
mod proptest_impls {
    use proptest::prelude::*;

    use super::{
        ErrorCode,
        ErrorMetadata,
    };

    impl Arbitrary for ErrorMetadata {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            any::<ErrorCode>()
                .prop_map(|ec| match ec {
                    ErrorCode::NotFound => ErrorMetadata::not_found("not", "found"),
                    ErrorCode::Conflict => ErrorMetadata::conflict("tri", "aged"),
                    ErrorCode::Precondition => ErrorMetadata::precondition("pre", "condition"),
                    ErrorCode::Transient => ErrorMetadata::transient("tran", "sient"),
                    ErrorCode::PermissionDenied => {
                        ErrorMetadata::permission_denied("perm", "denied")
                    },
                    ErrorCode::Fatal => ErrorMetadata::fatal("fat", "al"),
                })
                .boxed()
        }
    }
}
