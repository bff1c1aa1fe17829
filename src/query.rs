//! Tool query engine — stateless list/get/search operations layered on the
//! registry.
//!
//! Every operation performs a live `tools/list` round trip against the
//! target server(s); nothing is cached between calls. Searches compile the
//! pattern once, filter the live listing, and project the hits down to
//! name + description.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::errors::RouterError;
use crate::registry::Registry;
use crate::types::{ToolDescriptor, ToolSummary};

// ─── Search Options ──────────────────────────────────────────────────────────

/// Which descriptor field(s) a search pattern is tested against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Description,
    #[default]
    Both,
}

/// Options for pattern searches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub search_in: SearchField,
    /// Case folding is applied unless set; searches are case-insensitive
    /// by default.
    pub case_sensitive: bool,
}

/// One entry in a cross-server search result: either a matching tool or an
/// in-band failure marker for a server that could not be listed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchEntry {
    Hit(ToolSummary),
    Failure { error: String },
}

// ─── Matching ────────────────────────────────────────────────────────────────

/// Compile a search pattern.
///
/// Matching is partial (unanchored) — pattern authors anchor with `^`/`$`
/// themselves when they want whole-string matches.
fn build_matcher(pattern: &str, options: &SearchOptions) -> Result<Regex, RouterError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|e| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Test one descriptor against a compiled pattern.
fn tool_matches(tool: &ToolDescriptor, matcher: &Regex, field: SearchField) -> bool {
    match field {
        SearchField::Name => matcher.is_match(&tool.name),
        SearchField::Description => matcher.is_match(&tool.description),
        SearchField::Both => matcher.is_match(&tool.name) || matcher.is_match(&tool.description),
    }
}

/// Filter a live listing down to projected summaries of the matching tools.
fn filter_tools(
    tools: &[ToolDescriptor],
    matcher: &Regex,
    field: SearchField,
) -> Vec<ToolSummary> {
    tools
        .iter()
        .filter(|tool| tool_matches(tool, matcher, field))
        .map(ToolSummary::from)
        .collect()
}

// ─── Query Operations ────────────────────────────────────────────────────────

impl Registry {
    /// Full live descriptor list for one server, shape unchanged.
    ///
    /// An upstream reporting zero tools yields an empty list, not an error.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, RouterError> {
        let sessions = self.sessions().await;
        let session = sessions.get(server).ok_or_else(|| RouterError::NotConnected {
            server: server.to_string(),
        })?;
        session.list_tools().await
    }

    /// Invoke a tool on one server and return the raw result value.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, RouterError> {
        let sessions = self.sessions().await;
        let session = sessions.get(server).ok_or_else(|| RouterError::NotConnected {
            server: server.to_string(),
        })?;
        session.call_tool(tool, arguments).await
    }

    /// Fetch the full descriptor (schema included) for one tool by exact,
    /// case-sensitive name.
    pub async fn get_tool(&self, server: &str, tool: &str) -> Result<ToolDescriptor, RouterError> {
        let tools = self.list_tools(server).await?;
        tools
            .into_iter()
            .find(|t| t.name == tool)
            .ok_or_else(|| RouterError::ToolNotFound {
                server: server.to_string(),
                tool: tool.to_string(),
            })
    }

    /// Search one server's live listing for tools matching `pattern`.
    ///
    /// Returns projected summaries (no input schema) — a lightweight grep
    /// result, distinct from [`Registry::get_tool`]'s full descriptor.
    pub async fn find_tools_in_server(
        &self,
        server: &str,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ToolSummary>, RouterError> {
        let matcher = build_matcher(pattern, options)?;
        let tools = self.list_tools(server).await?;
        Ok(filter_tools(&tools, &matcher, options.search_in))
    }

    /// Search every connected server, isolating per-server failures.
    ///
    /// The pattern is compiled once, up front — an invalid pattern fails
    /// the whole call before any server is contacted. Servers are then
    /// queried sequentially: servers with matches contribute their hit
    /// lists, a server whose listing fails contributes a single in-band
    /// failure entry, and servers with no matches are omitted. One bad
    /// upstream never masks results from the others.
    pub async fn find_tools(
        &self,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<BTreeMap<String, Vec<SearchEntry>>, RouterError> {
        let matcher = build_matcher(pattern, options)?;
        let mut results = BTreeMap::new();

        for server in self.list().await {
            match self.list_tools(&server).await {
                Ok(tools) => {
                    let hits = filter_tools(&tools, &matcher, options.search_in);
                    if !hits.is_empty() {
                        results.insert(server, hits.into_iter().map(SearchEntry::Hit).collect());
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "tool search failed for server");
                    results.insert(
                        server,
                        vec![SearchEntry::Failure {
                            error: e.to_string(),
                        }],
                    );
                }
            }
        }

        Ok(results)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
