//! Tibber's GraphQL HTTP API, used to find the home to follow and where its live feed lives.
use serde::Deserialize;
use serde_json::json;
use std::error;
use std::fmt;
use std::io;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.tibber.com/v1-beta/gql";
pub const USER_AGENT: &str = concat!("tibber_pulse/", env!("CARGO_PKG_VERSION"));

const VIEWER_QUERY: &str = "{ viewer { websocketSubscriptionUrl homes { id } } }";

#[derive(Debug)]
pub enum ApiError {
    Http(Box<ureq::Error>),
    Decode(io::Error),

    /// The API answered with GraphQL errors
    GraphQl(String),

    /// The token's account has no homes
    NoHomes,

    /// The configured home is not one of the account's homes
    UnknownHome(String),

    /// The account has no live feed (e.g. no Pulse device)
    NoSubscriptionUrl,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ApiError::Http(ref e) => write!(f, "request to tibber api failed: {}", e),
            ApiError::Decode(ref e) => write!(f, "unable to decode tibber api response: {}", e),
            ApiError::GraphQl(ref msg) => write!(f, "tibber api returned errors: {}", msg),
            ApiError::NoHomes => write!(f, "no homes found for access token"),
            ApiError::UnknownHome(ref id) => write!(f, "home {} not found for access token", id),
            ApiError::NoSubscriptionUrl => write!(f, "no websocket subscription url advertised"),
        }
    }
}

impl error::Error for ApiError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            ApiError::Http(ref e) => Some(e.as_ref()),
            ApiError::Decode(ref e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug)]
struct GraphQlResponse {
    data: Option<ViewerData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize, Debug)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct ViewerData {
    viewer: Viewer,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Viewer {
    websocket_subscription_url: Option<String>,
    #[serde(default)]
    homes: Vec<Home>,
}

#[derive(Deserialize, Debug)]
struct Home {
    id: String,
}

/// Where the live measurements of a home are streamed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTarget {
    pub websocket_url: String,
    pub home_id: String,
}

pub struct TibberApi {
    agent: ureq::Agent,
    url: String,
    access_token: String,
}

impl TibberApi {
    pub fn new(url: &str, access_token: &str) -> Self {
        TibberApi {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .user_agent(USER_AGENT)
                .build(),
            url: url.to_owned(),
            access_token: access_token.to_owned(),
        }
    }

    /// Looks up the live feed of `home_id`, or of the account's first home when no home is
    /// given.
    pub fn feed_target(&self, home_id: Option<&str>) -> Result<FeedTarget, ApiError> {
        let resp: GraphQlResponse = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .send_json(json!({ "query": VIEWER_QUERY }))
            .map_err(|e| ApiError::Http(Box::new(e)))?
            .into_json()
            .map_err(ApiError::Decode)?;

        if !resp.errors.is_empty() {
            let messages: Vec<&str> = resp.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(ApiError::GraphQl(messages.join("; ")));
        }

        let viewer = match resp.data {
            Some(data) => data.viewer,
            None => return Err(ApiError::GraphQl(String::from("response has no data"))),
        };

        let home = match home_id {
            Some(id) => viewer
                .homes
                .into_iter()
                .find(|h| h.id == id)
                .ok_or_else(|| ApiError::UnknownHome(id.to_owned()))?,
            None => viewer.homes.into_iter().next().ok_or(ApiError::NoHomes)?,
        };

        let websocket_url = viewer
            .websocket_subscription_url
            .ok_or(ApiError::NoSubscriptionUrl)?;

        Ok(FeedTarget {
            websocket_url,
            home_id: home.id,
        })
    }
}
