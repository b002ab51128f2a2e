//! The closed set of feed variants served by the relay and the lifecycle
//! states a feed connection moves through.

use crate::config::SovereignConfig;

/// Fixed path of the unfiltered firehose
pub const STANDARD_FEED_PATH: &str = "/xrpc/com.atproto.sync.subscribeRepos";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedKind {
    /// Unfiltered, unauthenticated rebroadcast of every relay event
    Standard,
    /// Jurisdiction-filtered feed behind a bearer credential
    Sovereign,
}

impl FeedKind {
    /// Label used on the active-connection gauge
    pub fn endpoint_label(&self) -> &'static str {
        match self {
            FeedKind::Standard => "standard",
            FeedKind::Sovereign => "sovereign",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedRoute {
    pub kind: FeedKind,
    pub path: String,
}

/// The sovereign feed path namespaces the subscription under the
/// jurisdiction code instead of the generic protocol namespace.
pub fn sovereign_feed_path(country_code: &str) -> String {
    format!(
        "/xrpc/{}.sovereign.sync.subscribeRepos",
        country_code.to_lowercase()
    )
}

/// Static routing table over the supported feed variants.
///
/// Every servable route is enumerable up front; upgrade requests are matched
/// against this table and nothing else.
pub struct RouteTable {
    routes: Vec<FeedRoute>,
}

impl RouteTable {
    pub fn new(config: &SovereignConfig) -> Self {
        let mut routes = vec![FeedRoute {
            kind: FeedKind::Standard,
            path: STANDARD_FEED_PATH.to_string(),
        }];

        if config.enabled {
            routes.push(FeedRoute {
                kind: FeedKind::Sovereign,
                path: sovereign_feed_path(&config.country_code),
            });
        }

        Self { routes }
    }

    /// Registered endpoint routes, standard feed first
    pub fn routes(&self) -> &[FeedRoute] {
        &self.routes
    }

    pub fn match_path(&self, path: &str) -> Option<&FeedRoute> {
        self.routes.iter().find(|route| route.path == path)
    }
}

/// Lifecycle of a single feed connection.
///
/// Standard connections begin at `Streaming`; sovereign connections begin at
/// `AwaitingAuth` and never reach `Upgrading` on a rejected credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingAuth,
    Upgrading,
    Streaming,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingAuth => "awaiting_auth",
            Self::Upgrading => "upgrading",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sovereign_config(enabled: bool, country_code: &str) -> SovereignConfig {
        SovereignConfig {
            enabled,
            country_code: country_code.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_config_registers_only_the_standard_feed() {
        let table = RouteTable::new(&sovereign_config(false, "CA"));

        assert_eq!(table.routes().len(), 1);
        assert_eq!(table.routes()[0].kind, FeedKind::Standard);
        assert_eq!(table.routes()[0].path, STANDARD_FEED_PATH);
    }

    #[test]
    fn enabled_config_adds_the_jurisdiction_namespaced_route() {
        let table = RouteTable::new(&sovereign_config(true, "CA"));

        assert_eq!(table.routes().len(), 2);
        assert_eq!(table.routes()[0].kind, FeedKind::Standard);
        assert_eq!(table.routes()[1].kind, FeedKind::Sovereign);
        assert_eq!(
            table.routes()[1].path,
            "/xrpc/ca.sovereign.sync.subscribeRepos"
        );
    }

    #[test]
    fn match_path_resolves_registered_routes_only() {
        let table = RouteTable::new(&sovereign_config(true, "ca"));

        assert_eq!(
            table.match_path(STANDARD_FEED_PATH).map(|r| r.kind),
            Some(FeedKind::Standard)
        );
        assert_eq!(
            table
                .match_path("/xrpc/ca.sovereign.sync.subscribeRepos")
                .map(|r| r.kind),
            Some(FeedKind::Sovereign)
        );
        assert!(table.match_path("/xrpc/us.sovereign.sync.subscribeRepos").is_none());
        assert!(table.match_path("/something-else").is_none());
    }

    #[test]
    fn sovereign_path_lowercases_the_jurisdiction_code() {
        assert_eq!(
            sovereign_feed_path("CA"),
            "/xrpc/ca.sovereign.sync.subscribeRepos"
        );
    }
}
