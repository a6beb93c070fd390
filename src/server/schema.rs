// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! GraphQL object types and the query root

use super::loader::DatasetLoader;
use super::paginator::{self, DatasetConnection};
use crate::catalog::{flatten_fields, DatasetRecord, FlatField, RunRecord, SidebarGroupRecord};
use crate::colors::{Colorscale, COLORMAP_SIZE};
use crate::config::Settings;
use crate::environment::{self, RuntimeContext, VERSION};
use crate::store::CatalogStore;
use async_graphql::dataloader::DataLoader;
use async_graphql::{Context, Enum, Interface, Object, Result, SimpleObject, ID};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared state available to every resolver
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub settings: Arc<Settings>,
    pub runtime: RuntimeContext,
}

impl AppState {
    pub fn new(store: Arc<dyn CatalogStore>, settings: Settings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            runtime: RuntimeContext::from_env(),
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(rename_items = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct Target {
    pub target: i32,
    pub value: String,
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct NamedTargets {
    pub name: String,
    pub targets: Vec<Target>,
}

#[derive(SimpleObject, Clone, Debug)]
pub struct SampleField {
    pub ftype: String,
    pub path: String,
    pub subfield: Option<String>,
    pub embedded_doc_type: Option<String>,
    pub db_field: Option<String>,
}

impl From<FlatField> for SampleField {
    fn from(field: FlatField) -> Self {
        Self {
            ftype: field.ftype,
            path: field.path,
            subfield: field.subfield,
            embedded_doc_type: field.embedded_doc_type,
            db_field: field.db_field,
        }
    }
}

#[derive(Interface)]
#[graphql(field(name = "cls", ty = "&String"))]
pub enum RunConfig {
    Brain(BrainRunConfig),
    Evaluation(EvaluationRunConfig),
}

#[derive(Interface)]
#[graphql(
    field(name = "key", ty = "&String"),
    field(name = "version", ty = "&String"),
    field(name = "timestamp", ty = "&DateTime<Utc>"),
    field(name = "config", ty = "RunConfig"),
    field(name = "view_stages", ty = "&Vec<String>")
)]
pub enum Run {
    Brain(BrainRun),
    Evaluation(EvaluationRun),
}

#[derive(SimpleObject, Clone, Debug)]
pub struct BrainRunConfig {
    pub cls: String,
    pub embeddings_field: Option<String>,
    pub method: String,
    pub patches_field: Option<String>,
}

#[derive(SimpleObject, Clone, Debug)]
pub struct BrainRun {
    pub key: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub config: BrainRunConfig,
    pub view_stages: Vec<String>,
}

impl From<RunRecord> for BrainRun {
    fn from(run: RunRecord) -> Self {
        let config = run.config;
        Self {
            key: run.key,
            version: run.version,
            timestamp: run.timestamp,
            config: BrainRunConfig {
                cls: config.cls,
                embeddings_field: config.embeddings_field,
                method: config.method.unwrap_or_default(),
                patches_field: config.patches_field,
            },
            view_stages: run.view_stages,
        }
    }
}

#[derive(SimpleObject, Clone, Debug)]
pub struct EvaluationRunConfig {
    pub cls: String,
    pub classwise: bool,
    pub error_level: i32,
    pub gt_field: String,
    pub pred_field: String,
    pub method: String,
}

impl From<&BrainRunConfig> for RunConfig {
    fn from(config: &BrainRunConfig) -> Self {
        RunConfig::Brain(config.clone())
    }
}

impl From<&EvaluationRunConfig> for RunConfig {
    fn from(config: &EvaluationRunConfig) -> Self {
        RunConfig::Evaluation(config.clone())
    }
}

#[derive(SimpleObject, Clone, Debug)]
pub struct EvaluationRun {
    pub key: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub config: EvaluationRunConfig,
    pub view_stages: Vec<String>,
}

impl From<RunRecord> for EvaluationRun {
    fn from(run: RunRecord) -> Self {
        let config = run.config;
        Self {
            key: run.key,
            version: run.version,
            timestamp: run.timestamp,
            config: EvaluationRunConfig {
                cls: config.cls,
                classwise: config.classwise.unwrap_or(false),
                error_level: config.error_level.unwrap_or(0),
                gt_field: config.gt_field.unwrap_or_default(),
                pred_field: config.pred_field.unwrap_or_default(),
                method: config.method.unwrap_or_default(),
            },
            view_stages: run.view_stages,
        }
    }
}

#[derive(SimpleObject, Clone, Debug)]
pub struct SidebarGroup {
    pub name: String,
    pub paths: Vec<String>,
}

impl From<SidebarGroupRecord> for SidebarGroup {
    fn from(group: SidebarGroupRecord) -> Self {
        Self {
            name: group.name,
            paths: group.paths,
        }
    }
}

#[derive(SimpleObject, Clone, Debug)]
pub struct Dataset {
    pub id: ID,
    pub name: String,
    pub created_at: NaiveDate,
    pub last_loaded_at: DateTime<Utc>,
    pub persistent: bool,
    pub media_type: Option<MediaType>,
    pub mask_targets: Vec<NamedTargets>,
    pub default_mask_targets: Option<Vec<Target>>,
    pub sample_fields: Vec<SampleField>,
    pub frame_fields: Vec<SampleField>,
    pub brain_methods: Vec<BrainRun>,
    pub evaluations: Vec<EvaluationRun>,
    pub app_sidebar_groups: Option<Vec<SidebarGroup>>,
    pub version: String,
}

/// Mask targets keyed by pixel value; keys that are not integers are dropped
fn targets(map: BTreeMap<String, String>) -> Vec<Target> {
    let mut targets: Vec<Target> = map
        .into_iter()
        .filter_map(|(key, value)| match key.parse::<i32>() {
            Ok(target) => Some(Target { target, value }),
            Err(_) => {
                tracing::warn!("Ignoring non-integer mask target '{}'", key);
                None
            }
        })
        .collect();
    targets.sort_by_key(|t| t.target);
    targets
}

impl From<DatasetRecord> for Dataset {
    fn from(record: DatasetRecord) -> Self {
        Self {
            id: ID(record.id),
            name: record.name,
            created_at: record.created_at.date_naive(),
            last_loaded_at: record.last_loaded_at,
            persistent: record.persistent,
            media_type: record.media_type.as_deref().and_then(MediaType::parse),
            mask_targets: record
                .mask_targets
                .into_iter()
                .map(|(name, map)| NamedTargets {
                    name,
                    targets: targets(map),
                })
                .collect(),
            default_mask_targets: Some(targets(record.default_mask_targets)),
            sample_fields: flatten_fields(&[], &record.sample_fields)
                .into_iter()
                .map(SampleField::from)
                .collect(),
            frame_fields: flatten_fields(&[], &record.frame_fields)
                .into_iter()
                .map(SampleField::from)
                .collect(),
            brain_methods: record.brain_methods.into_values().map(BrainRun::from).collect(),
            evaluations: record.evaluations.into_values().map(EvaluationRun::from).collect(),
            app_sidebar_groups: record
                .app_sidebar_groups
                .map(|groups| groups.into_iter().map(SidebarGroup::from).collect()),
            version: record.version,
        }
    }
}

#[derive(SimpleObject, Clone, Debug)]
pub struct AppConfig {
    pub timezone: Option<String>,
    pub colorscale: String,
    pub color_pool: Vec<String>,
    pub grid_zoom: i32,
    pub loop_videos: bool,
    pub notebook_height: i32,
    pub show_confidence: bool,
    pub show_index: bool,
    pub show_label: bool,
    pub show_tooltip: bool,
    pub use_frame_number: bool,
}

impl From<&Settings> for AppConfig {
    fn from(settings: &Settings) -> Self {
        let app = &settings.app;
        Self {
            timezone: settings.timezone.clone(),
            colorscale: app.colorscale.clone(),
            color_pool: app.color_pool.clone(),
            grid_zoom: app.grid_zoom,
            loop_videos: app.loop_videos,
            notebook_height: app.notebook_height,
            show_confidence: app.show_confidence,
            show_index: app.show_index,
            show_label: app.show_label,
            show_tooltip: app.show_tooltip,
            use_frame_number: app.use_frame_number,
        }
    }
}

pub struct Query;

#[Object]
impl Query {
    /// RGB colormap of the configured colorscale
    async fn colorscale(&self, ctx: &Context<'_>) -> Result<Option<Vec<Vec<i32>>>> {
        let state = ctx.data::<AppState>()?;
        let name = &state.settings.app.colorscale;
        if name.is_empty() {
            return Ok(None);
        }
        let scale: Colorscale = name.parse()?;
        Ok(Some(
            scale
                .colormap(COLORMAP_SIZE)
                .into_iter()
                .map(|rgb| rgb.iter().map(|c| *c as i32).collect())
                .collect(),
        ))
    }

    async fn config(&self, ctx: &Context<'_>) -> Result<AppConfig> {
        let state = ctx.data::<AppState>()?;
        Ok(AppConfig::from(state.settings.as_ref()))
    }

    async fn context(&self, ctx: &Context<'_>) -> Result<String> {
        Ok(ctx.data::<AppState>()?.runtime.as_str().to_string())
    }

    async fn dev(&self, ctx: &Context<'_>) -> Result<bool> {
        Ok(environment::is_dev_build(ctx.data::<AppState>()?.settings.dev))
    }

    async fn do_not_track(&self, ctx: &Context<'_>) -> Result<bool> {
        Ok(ctx.data::<AppState>()?.settings.do_not_track)
    }

    async fn dataset(&self, ctx: &Context<'_>, name: String) -> Result<Option<Dataset>> {
        let loader = ctx.data::<DataLoader<DatasetLoader>>()?;
        Ok(loader.load_one(name).await?)
    }

    async fn datasets(
        &self,
        ctx: &Context<'_>,
        search: Option<String>,
        #[graphql(default = 10)] first: i32,
        after: Option<String>,
    ) -> Result<DatasetConnection> {
        let state = ctx.data::<AppState>()?;
        paginator::datasets(state.store.as_ref(), search, first, after).await
    }

    async fn teams_submission(&self, ctx: &Context<'_>) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        Ok(environment::teams_submission(&state.settings.teams_path).await?)
    }

    async fn uuid(&self, ctx: &Context<'_>) -> Result<String> {
        let state = ctx.data::<AppState>()?;
        let (uid, _) = environment::user_id(&state.settings.uid_path).await?;
        Ok(uid)
    }

    async fn version(&self) -> &'static str {
        VERSION
    }
}
