//! Query interpreter: turns a resource name and URL query into a
//! [`TransformRequest`].
//!
//! ## Resource names
//!
//! ```text
//! <key>[.<extension>[:<modifier>]]
//! ```
//!
//! The key ends at the first `.`. The extension is lowercased. The modifier
//! is carried through untouched and interpreted by the encoder (JPEG and AVIF
//! read it as quality).
//!
//! ## Operations
//!
//! Every query parameter whose name matches a registered operation queues
//! that operation with the parameter's value as its argument. Only the first
//! value of a repeated parameter counts and empty values are ignored.
//! Unrecognised parameters are ignored.
//!
//! ## Ordering
//!
//! `order=name:priority,name:priority` assigns integer priorities. Steps run
//! in descending priority. Ties keep registry order.
//!
//! ```text
//! ?size=800&blur=2                → size, blur
//! ?size=800&blur=2&order=blur:1   → blur, size
//! ```

use std::collections::BTreeMap;

use crate::error::{MediaError, Result};
use crate::imaging::{Registry, Step};
use crate::store::validate_key;

/// Parsed `<key>[.<ext>[:<modifier>]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub key: String,
    pub extension: Option<String>,
    pub modifier: Option<String>,
}

impl Resource {
    pub fn parse(resource: &str) -> Result<Self> {
        let (key, rest) = match resource.split_once('.') {
            Some((key, rest)) => (key, Some(rest)),
            None => (resource, None),
        };
        validate_key(key)?;

        let (extension, modifier) = match rest {
            None => (None, None),
            Some(rest) => match rest.split_once(':') {
                Some((ext, modifier)) => (Some(ext), Some(modifier)),
                None => (Some(rest), None),
            },
        };

        Ok(Self {
            key: key.to_string(),
            extension: extension
                .filter(|e| !e.is_empty())
                .map(str::to_ascii_lowercase),
            modifier: modifier.filter(|m| !m.is_empty()).map(str::to_string),
        })
    }
}

/// Everything needed to negotiate and render one derived representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformRequest {
    pub extension: Option<String>,
    pub modifier: Option<String>,
    /// Queued operations in execution order.
    pub steps: Vec<Step>,
}

impl TransformRequest {
    /// Build a request from resource parts and raw query pairs.
    pub fn new(
        extension: Option<String>,
        modifier: Option<String>,
        params: &[(String, String)],
        registry: &Registry,
    ) -> Result<Self> {
        let priorities = match first_value(params, "order") {
            Some(order) => parse_order(order)?,
            None => BTreeMap::new(),
        };

        let mut steps: Vec<Step> = registry
            .names()
            .filter_map(|name| {
                first_value(params, name).map(|args| {
                    let priority = priorities.get(name).copied().unwrap_or(0);
                    Step::new(name, args).with_priority(priority)
                })
            })
            .collect();
        // Stable: equal priorities keep registry order.
        steps.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self {
            extension,
            modifier,
            steps,
        })
    }

    pub fn has_operations(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Canonical form of the queued operations.
    ///
    /// Two requests that would run the same steps with the same arguments in
    /// the same order produce the same string, whatever the order or
    /// duplication of their original query parameters.
    pub fn canonical_query(&self) -> String {
        let mut pairs: Vec<(&str, String)> = self
            .steps
            .iter()
            .map(|s| (s.name.as_str(), s.args.clone()))
            .collect();
        pairs.sort();

        let mut ranked: Vec<String> = self
            .steps
            .iter()
            .filter(|s| s.priority != 0)
            .map(|s| format!("{}:{}", s.name, s.priority))
            .collect();
        if !ranked.is_empty() {
            ranked.sort();
            pairs.push(("order", ranked.join(",")));
        }

        serde_urlencoded::to_string(&pairs).unwrap_or_default()
    }
}

/// Parse a resource name plus query pairs in one go.
pub fn interpret(
    resource: &str,
    params: &[(String, String)],
    registry: &Registry,
) -> Result<(String, TransformRequest)> {
    let Resource {
        key,
        extension,
        modifier,
    } = Resource::parse(resource)?;
    let request = TransformRequest::new(extension, modifier, params, registry)?;
    Ok((key, request))
}

fn first_value<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, v)| k == name && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

/// Parse `name:priority,name:priority`.
///
/// Every entry must carry a name and an integer priority. A later entry for
/// the same name wins.
pub fn parse_order(order: &str) -> Result<BTreeMap<String, i64>> {
    let mut priorities = BTreeMap::new();
    for entry in order.split(',') {
        let (name, priority) = entry.split_once(':').ok_or_else(|| {
            MediaError::InvalidInput(format!("order key `{entry}` missing number"))
        })?;
        if name.is_empty() {
            return Err(MediaError::InvalidInput(format!(
                "order entry `{entry}` has no operation name"
            )));
        }
        let priority: i64 = priority.parse().map_err(|e| {
            MediaError::InvalidInput(format!("order key `{name}` has bad priority `{priority}`: {e}"))
        })?;
        priorities.insert(name.to_string(), priority);
    }
    Ok(priorities)
}
