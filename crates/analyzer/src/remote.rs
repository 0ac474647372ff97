// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote service access for the indexer.
//!
//! [`DataService`] is the seam the pipeline is written against; the HTTP
//! implementation speaks the remote API's OData dialect through a pooled
//! [`ServiceClient`]. Tests script the trait instead.

use async_trait::async_trait;
use ddk_sdk::{ClientError, ServiceClient};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote request failed: {0}")]
    Client(#[from] ClientError),

    #[error("unexpected remote payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSolution {
    pub solution_id: String,
    pub unique_name: String,
    pub friendly_name: String,
    pub publisher: String,
    pub is_managed: bool,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteComponent {
    pub component_id: String,
    pub component_type: String,
    pub type_code: i64,
    pub object_id: String,
    pub logical_name: String,
    pub display_name: String,
    /// True for entity-scoped component kinds (attribute, form, view, ...)
    /// whose owning table must be resolved through metadata.
    pub entity_scoped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteLayer {
    pub solution_id: String,
    pub solution_name: String,
    pub publisher: String,
    pub is_managed: bool,
    pub version: String,
    pub created_on: String,
    /// Attribute names the change record enumerates for this layer.
    pub changed_attributes: Vec<String>,
    /// Layer payload, when the endpoint inlines it.
    pub component_json: Option<String>,
}

/// Everything the indexer needs from the remote environment.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Solutions whose unique names are in `names`.
    async fn solutions_by_name(&self, names: &[String]) -> Result<Vec<RemoteSolution>, RemoteError>;

    /// Component membership of one solution.
    async fn components_of_solution(
        &self,
        solution_id: &str,
    ) -> Result<Vec<RemoteComponent>, RemoteError>;

    /// The layer stack of a component, ordered base → top.
    async fn layers_of_component(
        &self,
        component: &RemoteComponent,
    ) -> Result<Vec<RemoteLayer>, RemoteError>;

    /// Full payload for one layer when it was not inlined.
    async fn component_payload(
        &self,
        component: &RemoteComponent,
        solution_name: &str,
    ) -> Result<Option<String>, RemoteError>;

    /// Owning table's logical name for an entity-scoped component.
    async fn table_logical_name(
        &self,
        component: &RemoteComponent,
    ) -> Result<Option<String>, RemoteError>;
}

/// OData-backed implementation.
pub struct HttpDataService {
    client: ServiceClient,
}

impl HttpDataService {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Collect the `value` arrays of a paged OData result.
    async fn collect_paged(&self, first: &str) -> Result<Vec<serde_json::Value>, RemoteError> {
        let mut out = Vec::new();
        let mut next = Some(first.to_string());
        while let Some(path) = next {
            let page = self.client.get_json(&path).await?;
            let values = page
                .get("value")
                .and_then(|v| v.as_array())
                .ok_or_else(|| RemoteError::Decode("missing value array".to_string()))?;
            out.extend(values.iter().cloned());
            next = page
                .get("@odata.nextLink")
                .and_then(|v| v.as_str())
                .and_then(|link| link.split_once("/api/").map(|(_, rest)| format!("/api/{rest}")));
        }
        Ok(out)
    }
}

fn text(value: &serde_json::Value, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn flag(value: &serde_json::Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[async_trait]
impl DataService for HttpDataService {
    async fn solutions_by_name(&self, names: &[String]) -> Result<Vec<RemoteSolution>, RemoteError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let filter = names
            .iter()
            .map(|n| format!("uniquename eq '{}'", n.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(" or ");
        let path = format!(
            "/api/data/v9.2/solutions?$select=solutionid,uniquename,friendlyname,ismanaged,version&$expand=publisherid($select=uniquename)&$filter={filter}"
        );
        let rows = self.collect_paged(&path).await?;
        Ok(rows
            .iter()
            .map(|row| RemoteSolution {
                solution_id: text(row, "solutionid"),
                unique_name: text(row, "uniquename"),
                friendly_name: text(row, "friendlyname"),
                publisher: row
                    .pointer("/publisherid/uniquename")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                is_managed: flag(row, "ismanaged"),
                version: text(row, "version"),
            })
            .collect())
    }

    async fn components_of_solution(
        &self,
        solution_id: &str,
    ) -> Result<Vec<RemoteComponent>, RemoteError> {
        let path = format!(
            "/api/data/v9.2/solutioncomponents?$select=solutioncomponentid,componenttype,objectid&$filter=_solutionid_value eq {solution_id}"
        );
        let rows = self.collect_paged(&path).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let type_code = row.get("componenttype").and_then(|v| v.as_i64()).unwrap_or(0);
                RemoteComponent {
                    component_id: text(row, "solutioncomponentid"),
                    component_type: component_type_name(type_code).to_string(),
                    type_code,
                    object_id: text(row, "objectid"),
                    logical_name: text(row, "msdyn_name"),
                    display_name: text(row, "msdyn_displayname"),
                    entity_scoped: is_entity_scoped(type_code),
                }
            })
            .collect())
    }

    async fn layers_of_component(
        &self,
        component: &RemoteComponent,
    ) -> Result<Vec<RemoteLayer>, RemoteError> {
        let path = format!(
            "/api/data/v9.2/msdyn_componentlayers?$filter=msdyn_componentid eq '{}'&$orderby=msdyn_order asc",
            component.object_id
        );
        let rows = self.collect_paged(&path).await?;
        Ok(rows
            .iter()
            .map(|row| RemoteLayer {
                solution_id: text(row, "msdyn_solutionid"),
                solution_name: text(row, "msdyn_solutionname"),
                publisher: text(row, "msdyn_publishername"),
                is_managed: text(row, "msdyn_solutioncomponentname") != "Active",
                version: text(row, "msdyn_solutionversion"),
                created_on: text(row, "msdyn_createdon"),
                changed_attributes: parse_changes(&text(row, "msdyn_changes")),
                component_json: row
                    .get("msdyn_componentjson")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            })
            .collect())
    }

    async fn component_payload(
        &self,
        component: &RemoteComponent,
        solution_name: &str,
    ) -> Result<Option<String>, RemoteError> {
        let path = format!(
            "/api/data/v9.2/msdyn_componentlayers?$select=msdyn_componentjson&$filter=msdyn_componentid eq '{}' and msdyn_solutionname eq '{}'",
            component.object_id,
            solution_name.replace('\'', "''")
        );
        let rows = self.collect_paged(&path).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("msdyn_componentjson"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    async fn table_logical_name(
        &self,
        component: &RemoteComponent,
    ) -> Result<Option<String>, RemoteError> {
        if !component.entity_scoped {
            return Ok(None);
        }
        let path = format!(
            "/api/data/v9.2/EntityDefinitions(MetadataId={})?$select=LogicalName",
            component.object_id
        );
        match self.client.get_json(&path).await {
            Ok(body) => Ok(body.get("LogicalName").and_then(|v| v.as_str()).map(str::to_string)),
            Err(ClientError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// The change record arrives as a JSON array of attribute names.
fn parse_changes(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Well-known component type codes of the remote data model.
fn component_type_name(code: i64) -> &'static str {
    match code {
        1 => "Entity",
        2 => "Attribute",
        9 => "OptionSet",
        24 => "Form",
        26 => "SavedQuery",
        29 => "Workflow",
        60 => "SystemForm",
        61 => "WebResource",
        62 => "SiteMap",
        80 => "ModelDrivenApp",
        _ => "Unknown",
    }
}

fn is_entity_scoped(code: i64) -> bool {
    matches!(code, 2 | 24 | 26 | 60)
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
