//! Error codes returned in the `error.code` field of DSM Web API responses.

pub const UNKNOWN_ERROR: i64 = 100;
pub const NO_PERMISSION: i64 = 105;
pub const SESSION_TIMEOUT: i64 = 106;
pub const SESSION_INTERRUPTED: i64 = 107;
pub const SID_NOT_FOUND: i64 = 119;
pub const BAD_REQUEST: i64 = 400;

/// Codes after which a fresh login and a single retry are worth attempting.
pub fn is_session_error(code: i64) -> bool {
    matches!(
        code,
        NO_PERMISSION | SESSION_TIMEOUT | SESSION_INTERRUPTED | SID_NOT_FOUND | BAD_REQUEST
    )
}

/// Which API a request belongs to, for code lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    Auth,
    Task,
    Other,
}

pub fn describe(kind: ApiKind, code: i64) -> String {
    let specific = match kind {
        ApiKind::Auth => describe_auth(code),
        ApiKind::Task => describe_task(code),
        ApiKind::Other => None,
    };
    specific
        .or_else(|| describe_common(code))
        .unwrap_or("Unknown error")
        .to_string()
}

fn describe_common(code: i64) -> Option<&'static str> {
    Some(match code {
        100 => "Unknown error",
        101 => "Invalid parameter",
        102 => "The requested API does not exist",
        103 => "The requested method does not exist",
        104 => "The requested version does not support the functionality",
        105 => "The logged in session does not have permission",
        106 => "Session timeout",
        107 => "Session interrupted by duplicate login",
        119 => "Session ID not found",
        _ => return None,
    })
}

fn describe_auth(code: i64) -> Option<&'static str> {
    Some(match code {
        400 => "No such account or incorrect password",
        401 => "Account disabled",
        402 => "Permission denied",
        403 => "2-step verification code required",
        404 => "Failed to authenticate 2-step verification code",
        _ => return None,
    })
}

fn describe_task(code: i64) -> Option<&'static str> {
    Some(match code {
        400 => "File upload failed",
        401 => "Max number of tasks reached",
        402 => "Destination denied",
        403 => "Destination does not exist",
        404 => "Invalid task id",
        405 => "Invalid task action",
        406 => "No default destination",
        407 => "Set destination failed",
        408 => "File does not exist",
        _ => return None,
    })
}
