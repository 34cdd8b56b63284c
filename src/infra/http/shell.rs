use std::path::Path;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::info;

use crate::infra::error::InfraError;
use crate::ssr::sidecar::escape_attribute;
use crate::ssr::{BoxError, RenderEngine, RenderTree, env};

/// The HTML document the client bundle boots from.
#[derive(Clone)]
pub struct ShellState {
    document: Bytes,
}

impl ShellState {
    pub fn new(document: impl Into<Bytes>) -> Self {
        Self {
            document: document.into(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let document = tokio::fs::read(path).await.map_err(|err| {
            InfraError::configuration(format!(
                "failed to read shell `{}`: {err}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), bytes = document.len(), "loaded document shell");
        Ok(Self::new(document))
    }
}

pub(super) async fn serve_shell(State(shell): State<ShellState>) -> Response {
    (
        [(CONTENT_TYPE, "text/html; charset=utf-8")],
        shell.document.clone(),
    )
        .into_response()
}

pub(super) async fn robots_txt() -> Response {
    ([(CONTENT_TYPE, "text/plain")], "User-agent: *\nAllow: /\n").into_response()
}

/// Renders each matched component as an empty, named element.
///
/// Stands in for a real view-layer engine when running the binary on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEngine;

#[async_trait]
impl RenderEngine for PlaceholderEngine {
    async fn render_to_string(&self, tree: &RenderTree) -> Result<String, BoxError> {
        let viewer = env::current_viewer();
        let components: String = tree
            .components
            .iter()
            .map(|component| {
                format!(
                    r#"<div data-component="{}"></div>"#,
                    escape_attribute(&component.name)
                )
            })
            .collect();
        Ok(format!(
            r#"<main data-route="{}" data-viewer="{}">{components}</main>"#,
            escape_attribute(&tree.location),
            escape_attribute(&viewer.to_string())
        ))
    }
}
