//! Subscription filter and URL construction.

use url::Url;

use crate::error::{JetstreamError, JetstreamResult};
use crate::event::JetstreamEvent;

/// Which events a subscription wants.
///
/// An empty list means "everything" for that dimension. Collection entries
/// may end in `.*` to match an NSID prefix (e.g. `app.bsky.graph.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub wanted_collections: Vec<String>,
    pub wanted_dids: Vec<String>,
}

impl SubscriptionFilter {
    /// Filter that accepts every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(wanted_collections: Vec<String>, wanted_dids: Vec<String>) -> Self {
        Self {
            wanted_collections,
            wanted_dids,
        }
    }

    /// Check a collection NSID against the wanted collections.
    pub fn wants_collection(&self, collection: &str) -> bool {
        self.wanted_collections.is_empty()
            || self.wanted_collections.iter().any(|wanted| {
                match wanted.strip_suffix(".*") {
                    Some(prefix) => collection
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('.')),
                    None => wanted == collection,
                }
            })
    }

    /// Check an author DID against the wanted DIDs.
    pub fn wants_did(&self, did: &str) -> bool {
        self.wanted_dids.is_empty() || self.wanted_dids.iter().any(|d| d == did)
    }

    /// Check a whole event. Non-commit events only go through the DID check.
    pub fn matches(&self, event: &JetstreamEvent) -> bool {
        if !self.wants_did(&event.did) {
            return false;
        }
        event.collection().map_or(true, |c| self.wants_collection(c))
    }
}

/// Build the Jetstream subscribe URL for an endpoint, filter, and optional
/// resume cursor (microseconds).
pub fn subscribe_url(
    endpoint: &str,
    filter: &SubscriptionFilter,
    cursor: Option<i64>,
) -> JetstreamResult<Url> {
    let mut url =
        Url::parse(endpoint).map_err(|e| JetstreamError::InvalidUrl(format!("{endpoint}: {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(JetstreamError::InvalidUrl(format!(
            "{endpoint}: expected ws:// or wss://"
        )));
    }

    {
        let mut query = url.query_pairs_mut();
        for collection in &filter.wanted_collections {
            query.append_pair("wantedCollections", collection);
        }
        for did in &filter.wanted_dids {
            query.append_pair("wantedDids", did);
        }
        if let Some(cursor) = cursor {
            query.append_pair("cursor", &cursor.to_string());
        }
    }

    // An empty query_pairs_mut() still leaves a trailing '?'
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_filters() {
        let url = subscribe_url(
            "wss://jetstream2.us-east.bsky.network/subscribe",
            &SubscriptionFilter::all(),
            None,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://jetstream2.us-east.bsky.network/subscribe"
        );
    }

    #[test]
    fn url_with_filters_and_cursor() {
        let filter = SubscriptionFilter::new(
            vec!["app.bsky.feed.post".into(), "app.bsky.feed.like".into()],
            vec!["did:plc:abc".into()],
        );
        let url = subscribe_url("ws://localhost:6008/subscribe", &filter, Some(1700)).unwrap();
        assert_eq!(
            url.query(),
            Some(
                "wantedCollections=app.bsky.feed.post&wantedCollections=app.bsky.feed.like\
                 &wantedDids=did%3Aplc%3Aabc&cursor=1700"
            )
        );
    }

    #[test]
    fn url_rejects_http_scheme() {
        let err = subscribe_url("https://example.com", &SubscriptionFilter::all(), None);
        assert!(matches!(err, Err(JetstreamError::InvalidUrl(_))));
    }

    #[test]
    fn url_rejects_garbage() {
        assert!(subscribe_url("not a url", &SubscriptionFilter::all(), None).is_err());
    }

    #[test]
    fn empty_filter_wants_everything() {
        let filter = SubscriptionFilter::all();
        assert!(filter.wants_collection("app.bsky.feed.post"));
        assert!(filter.wants_did("did:plc:anyone"));
    }

    #[test]
    fn collection_prefix_wildcard() {
        let filter = SubscriptionFilter::new(vec!["app.bsky.graph.*".into()], vec![]);
        assert!(filter.wants_collection("app.bsky.graph.follow"));
        assert!(!filter.wants_collection("app.bsky.graphx.follow"));
        assert!(!filter.wants_collection("app.bsky.feed.post"));
    }

    #[test]
    fn did_filter_applies_to_events() {
        let filter = SubscriptionFilter::new(vec![], vec!["did:plc:wanted".into()]);
        let event = JetstreamEvent::parse(
            r#"{"did":"did:plc:other","time_us":1,"kind":"commit",
                "commit":{"operation":"create","collection":"app.bsky.feed.post","record":{"text":"x"}}}"#,
        )
        .unwrap();
        assert!(!filter.matches(&event));
    }
}
