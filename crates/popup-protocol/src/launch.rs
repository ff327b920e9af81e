//! Launch parameters handed to popup content that lives in another context.
//!
//! Url content and native windows receive their identity through a query
//! string: `popupId`, `channelId`, `theme`, and an optional JSON-serialized
//! `data` value. Native windows additionally get the same fields as a custom
//! JSON payload. Structured content routed through a native window encodes the
//! component name in the path and its props as a `props` query value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::{ChannelId, PopupId, Theme};

/// Errors from reading launch parameters.
#[derive(Debug, Error)]
pub enum Error {
    /// A required query key was absent.
    #[error("missing launch parameter '{0}'")]
    Missing(&'static str),
    /// The `theme` value is not a known theme.
    #[error(transparent)]
    Theme(#[from] crate::UnknownTheme),
    /// The `data` or custom payload was not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Identity and initial state of a popup as seen by its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParams {
    /// Popup being launched.
    pub popup_id: PopupId,
    /// Channel the content should join.
    pub channel_id: ChannelId,
    /// Theme at open time.
    pub theme: Theme,
    /// Initial data for the content, carried as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LaunchParams {
    /// Parameters without initial data.
    pub fn new(popup_id: PopupId, channel_id: ChannelId, theme: Theme) -> Self {
        Self {
            popup_id,
            channel_id,
            theme,
            data: None,
        }
    }

    /// Attach initial data for the content.
    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }

    /// Query keys and values, in wire order.
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("popupId", self.popup_id.as_str().to_string()),
            ("channelId", self.channel_id.as_str().to_string()),
            ("theme", self.theme.as_str().to_string()),
        ];
        if let Some(data) = &self.data {
            pairs.push(("data", data.to_string()));
        }
        pairs
    }

    /// Render as a query string without the leading `?`.
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }

    /// Append the parameters to `url`, preserving any existing query and
    /// fragment. Relative routes are extended in place.
    pub fn append_to_url(&self, url: &str) -> String {
        match Url::parse(url) {
            Ok(mut parsed) => {
                parsed.query_pairs_mut().extend_pairs(self.pairs());
                parsed.into()
            }
            Err(_) => append_relative(url, &self.to_query()),
        }
    }

    /// Parse parameters from a query string, a `?`-prefixed query, or a
    /// url. Unknown keys are ignored.
    pub fn from_query(input: &str) -> Result<Self, Error> {
        let mut popup_id = None;
        let mut channel_id = None;
        let mut theme = None;
        let mut data = None;
        for (key, value) in form_urlencoded::parse(query_of(input).as_bytes()) {
            match key.as_ref() {
                "popupId" => popup_id = Some(PopupId::new(value.into_owned())),
                "channelId" => channel_id = Some(ChannelId::new(value.into_owned())),
                "theme" => theme = Some(value.parse::<Theme>()?),
                "data" => data = Some(serde_json::from_str(&value)?),
                _ => {}
            }
        }
        Ok(Self {
            popup_id: popup_id.ok_or(Error::Missing("popupId"))?,
            channel_id: channel_id.ok_or(Error::Missing("channelId"))?,
            theme: theme.unwrap_or_default(),
            data,
        })
    }

    /// Custom payload handed to a native window.
    pub fn to_custom_data(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Read parameters back from a native window's custom payload.
    pub fn from_custom_data(value: Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Route for structured content opened in a context that cannot render it
/// directly: `{base}/{component}?props=<json>&<launch query>`.
pub fn component_route(
    base: &str,
    component: &str,
    props: &Value,
    params: &LaunchParams,
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("props", &props.to_string())
        .extend_pairs(params.pairs())
        .finish();
    if let Ok(mut url) = Url::parse(base) {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(component);
        }
        url.set_query(Some(query.as_str()));
        return url.into();
    }
    let segment: String = form_urlencoded::byte_serialize(component.as_bytes()).collect();
    format!("{}/{segment}?{query}", base.trim_end_matches('/'))
}

/// Read the `props` value back out of a component route.
pub fn props_from_route(route: &str) -> Result<Value, Error> {
    match form_urlencoded::parse(query_of(route).as_bytes()).find(|(k, _)| *k == "props") {
        Some((_, value)) => Ok(serde_json::from_str(&value)?),
        None => Ok(Value::Null),
    }
}

/// Append an encoded `query` to a relative route, keeping any existing query
/// and fragment.
fn append_relative(route: &str, query: &str) -> String {
    let (base, fragment) = match route.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (route, None),
    };
    let sep = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    match fragment {
        Some(f) => format!("{base}{sep}{query}#{f}"),
        None => format!("{base}{sep}{query}"),
    }
}

/// Query portion of a url, a relative route, or a bare query string.
fn query_of(input: &str) -> String {
    if let Ok(url) = Url::parse(input) {
        return url.query().unwrap_or_default().to_string();
    }
    let without_fragment = input.split('#').next().unwrap_or_default();
    match without_fragment.split_once('?') {
        Some((_, q)) => q.to_string(),
        None if without_fragment.contains('=') => without_fragment.to_string(),
        None => String::new(),
    }
}
