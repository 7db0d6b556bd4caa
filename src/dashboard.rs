use crate::batch::RenderRequest;
use crate::error::Error;
use crate::network::{Endpoint, get_json};
use console::style;
use reqwest::Client;
use serde::Deserialize;

// region: Structs & Enums
/// What the dashboard API tells us about a dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardInfo {
    pub uid: String,
    pub slug: String,
    pub panel_ids: Vec<String>,
}

/// The panels a run should render, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Fully specified panels, possibly from several dashboards.
    Panels(Vec<RenderRequest>),
    /// Panels of a single dashboard. An empty panel list means all of them,
    /// unless `whole` asks for the dashboard as a single image.
    Dashboard {
        id: String,
        slug: Option<String>,
        panel_ids: Vec<String>,
        whole: bool,
    },
}

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    meta: DashboardMeta,
    dashboard: DashboardModel,
}

#[derive(Debug, Deserialize)]
struct DashboardMeta {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct DashboardModel {
    #[serde(default)]
    panels: Vec<PanelModel>,
}

#[derive(Debug, Deserialize)]
struct PanelModel {
    id: Option<u64>,
    #[serde(rename = "type", default)]
    kind: String,
    // Collapsed rows carry their panels here.
    #[serde(default)]
    panels: Vec<PanelModel>,
}
// endregion

// region: Functions
/// Looks up slug and panel ids of a dashboard by its uid.
pub async fn lookup_dashboard(
    client: &Client,
    endpoint: &Endpoint,
    uid: &str,
) -> Result<DashboardInfo, Error> {
    let url = endpoint.url(&["api", "dashboards", "uid", uid]);
    let response: DashboardResponse = get_json(client, endpoint, url)
        .await
        .map_err(|e| Error::lookup(uid, e))?;

    let mut panel_ids = Vec::new();
    collect_panel_ids(&response.dashboard.panels, &mut panel_ids);

    Ok(DashboardInfo {
        uid: uid.to_string(),
        slug: response.meta.slug,
        panel_ids,
    })
}

fn collect_panel_ids(panels: &[PanelModel], ids: &mut Vec<String>) {
    for panel in panels {
        if panel.kind == "row" {
            collect_panel_ids(&panel.panels, ids);
        } else if let Some(id) = panel.id {
            ids.push(id.to_string());
        }
    }
}

/// Turns a selection into render requests, asking the dashboard API for the
/// slug and panel list where the command line left them out.
pub async fn resolve_requests(
    selection: Selection,
    client: &Client,
    endpoint: &Endpoint,
    quiet: bool,
) -> Result<Vec<RenderRequest>, Error> {
    if !quiet {
        eprintln!("{} 🔎 Resolve panels...", style("[1/4]").dim());
    }

    let (id, slug, panel_ids, whole) = match selection {
        Selection::Panels(requests) => return Ok(requests),
        Selection::Dashboard {
            id,
            slug,
            panel_ids,
            whole,
        } => (id, slug, panel_ids, whole),
    };

    let needs_panels = !whole && panel_ids.is_empty();
    if slug.is_some() && !needs_panels {
        return Ok(build_requests(&id, slug.as_deref(), panel_ids, whole));
    }

    tracing::debug!(dashboard = %id, "looking up dashboard");
    let info = lookup_dashboard(client, endpoint, &id).await?;
    let slug = slug.unwrap_or(info.slug);

    let panel_ids = if needs_panels {
        if info.panel_ids.is_empty() {
            return Err(Error::lookup(&id, "the dashboard has no panels"));
        }
        tracing::info!(dashboard = %id, panels = ?info.panel_ids, "rendering all panels");
        info.panel_ids
    } else {
        panel_ids
    };

    Ok(build_requests(&id, Some(&slug), panel_ids, whole))
}

fn build_requests(
    id: &str,
    slug: Option<&str>,
    panel_ids: Vec<String>,
    whole: bool,
) -> Vec<RenderRequest> {
    if whole {
        return vec![RenderRequest::dashboard(id, slug)];
    }
    panel_ids
        .iter()
        .map(|panel_id| RenderRequest::panel(id, slug, panel_id))
        .collect()
}
// endregion
