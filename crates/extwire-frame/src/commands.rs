//! Built-in command names.
//!
//! Names are case-sensitive. Anything not listed here is still a valid
//! command; it is routed only if the helper registered a handler for it.

/// Liveness probe.
pub const PING: &str = "PING";
/// Liveness acknowledgment.
pub const PONG: &str = "PONG";
/// Host asks the helper to shut down.
pub const SHUTDOWN: &str = "SHUTDOWN";
/// Host delivers an HTTP session token.
pub const HTTPAUTH: &str = "HTTPAUTH";
/// Helper asks the host for an HTTP session token.
pub const HTTPAUTHREQ: &str = "HTTPAUTHREQ";
/// Host forwards an HTTP request for a registered URI.
pub const HTTPREQUEST: &str = "HTTPREQUEST";
/// Helper streams (part of) an HTTP response.
pub const HTTPRESPONSE: &str = "HTTPRESPONSE";
/// Helper registers a URI with the host web server.
pub const HTTPREGISTERURI: &str = "HTTPREGISTERURI";
/// Helper posts a message-bus message.
pub const MESSAGE: &str = "MESSAGE";

/// Inbound: configure a running datasource.
pub const KDSCONFIGURE: &str = "KDSCONFIGURE";
/// Inbound: probe whether a source definition is supported.
pub const KDSPROBESOURCE: &str = "KDSPROBESOURCE";
/// Inbound: open a source for capture.
pub const KDSOPENSOURCE: &str = "KDSOPENSOURCE";
/// Inbound: list interfaces this helper can capture from.
pub const KDSLISTINTERFACES: &str = "KDSLISTINTERFACES";

/// Outbound: datasource runtime error.
pub const KDSERROR: &str = "KDSERROR";
/// Outbound: answer to `KDSCONFIGURE`.
pub const KDSCONFIGUREREPORT: &str = "KDSCONFIGUREREPORT";
/// Outbound: answer to `KDSLISTINTERFACES`.
pub const KDSINTERFACESREPORT: &str = "KDSINTERFACESREPORT";
/// Outbound: announce a remote source.
pub const KDSNEWSOURCE: &str = "KDSNEWSOURCE";
/// Outbound: answer to `KDSOPENSOURCE`.
pub const KDSOPENSOURCEREPORT: &str = "KDSOPENSOURCEREPORT";
/// Outbound: answer to `KDSPROBESOURCE`.
pub const KDSPROBESOURCEREPORT: &str = "KDSPROBESOURCEREPORT";
/// Outbound: non-fatal source warning.
pub const KDSWARNINGREPORT: &str = "KDSWARNINGREPORT";

const BUILTIN: &[&str] = &[
    PING,
    PONG,
    SHUTDOWN,
    HTTPAUTH,
    HTTPAUTHREQ,
    HTTPREQUEST,
    HTTPRESPONSE,
    HTTPREGISTERURI,
    MESSAGE,
    KDSCONFIGURE,
    KDSPROBESOURCE,
    KDSOPENSOURCE,
    KDSLISTINTERFACES,
    KDSERROR,
    KDSCONFIGUREREPORT,
    KDSINTERFACESREPORT,
    KDSNEWSOURCE,
    KDSOPENSOURCEREPORT,
    KDSPROBESOURCEREPORT,
    KDSWARNINGREPORT,
];

/// Returns true if `name` is one of the protocol's built-in command names.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN.contains(&name)
}

/// Returns true if `name` belongs to the datasource command family.
pub fn is_datasource(name: &str) -> bool {
    name.starts_with("KDS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_case_sensitive() {
        assert!(is_builtin("PING"));
        assert!(!is_builtin("ping"));
        assert!(!is_builtin("CUSTOMCMD"));
    }

    #[test]
    fn datasource_family() {
        assert!(is_datasource(KDSPROBESOURCE));
        assert!(is_datasource(KDSWARNINGREPORT));
        assert!(!is_datasource(HTTPREQUEST));
    }
}
