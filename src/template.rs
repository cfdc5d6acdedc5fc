use crate::model::{AutopilotSettings, Level, Period, Rotation, RotationId, RotationKind};
use crate::need::Need;
use crate::planner::PlanError;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Description complète d'une rotation, telle qu'écrite dans un fichier JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationTemplate {
    pub id: String,
    pub name: String,
    /// `weekly`, `biweekly` ou `monthly`.
    pub period: String,
    /// Date de début `AAAA-MM-JJ`.
    pub start: String,
    pub size: u32,
    #[serde(default)]
    pub grace: u32,
    #[serde(default)]
    pub kind: RotationKind,
    #[serde(default)]
    pub needs: Vec<NeedSpec>,
    #[serde(default)]
    pub autopilot: AutopilotSettings,
}

/// Besoin sous forme de fichier : `max` vaut -1 (ou absent) pour « illimité ».
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedSpec {
    pub skill: String,
    pub level: String,
    #[serde(default)]
    pub min: u32,
    #[serde(default = "unbounded")]
    pub max: i64,
}

fn unbounded() -> i64 {
    -1
}

impl NeedSpec {
    pub fn to_need(&self) -> Result<Need> {
        let level: Level = self.level.parse().map_err(anyhow::Error::msg)?;
        Need::from_counts(self.skill.trim(), level, self.min, self.max).map_err(anyhow::Error::msg)
    }
}

impl RotationTemplate {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("rotation id cannot be empty");
        }
        if self.id.contains('/') {
            bail!("rotation id cannot contain '/'");
        }
        if self.name.trim().is_empty() {
            bail!("rotation name cannot be empty");
        }
        self.period()?;
        self.start_date()?;
        let mut keys = Vec::new();
        for entry in &self.needs {
            let need = entry.to_need()?;
            if keys.contains(&need.key()) {
                bail!("duplicate need {}", need.key());
            }
            keys.push(need.key());
        }
        Ok(())
    }

    pub fn period(&self) -> Result<Period, PlanError> {
        self.period
            .parse()
            .map_err(|_| PlanError::InvalidPeriod(self.period.clone()))
    }

    pub fn start_date(&self) -> Result<NaiveDate, PlanError> {
        NaiveDate::parse_from_str(self.start.trim(), "%Y-%m-%d").map_err(|_| PlanError::InvalidDate(self.start.clone()))
    }

    /// Les erreurs de période, de date et de besoin restent typées.
    pub fn to_rotation(&self) -> Result<Rotation, PlanError> {
        let period = self.period()?;
        let start = self.start_date()?;
        let needs = self
            .needs
            .iter()
            .map(|entry| entry.to_need().map_err(|e| PlanError::InvalidNeed(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        self.validate()?;
        let mut rotation = Rotation::new(self.name.trim(), period, start, self.size);
        rotation.id = RotationId::new(self.id.trim());
        rotation.grace = self.grace;
        rotation.kind = self.kind;
        rotation.autopilot = self.autopilot.clone();
        rotation.needs = needs;
        Ok(rotation)
    }
}

#[derive(Debug, Clone)]
pub struct TemplateInfo {
    pub template: RotationTemplate,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}

/// Gestion simple des templates persistés sur disque.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    base_dir: PathBuf,
}

impl TemplateStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            base_dir: dir.as_ref().to_path_buf(),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("creating template directory {}", self.base_dir.display()))
    }

    pub fn save(&self, template: &RotationTemplate) -> Result<PathBuf> {
        template.validate()?;
        self.ensure_dir()?;
        let path = self.base_dir.join(format!("{}.json", template.id));
        let json = serde_json::to_string_pretty(template)?;
        fs::write(&path, json).with_context(|| format!("writing template {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, id: &str) -> Result<RotationTemplate> {
        load_template_from_file(self.base_dir.join(format!("{}.json", id)))
    }

    pub fn list(&self) -> Result<Vec<TemplateInfo>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut infos = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read(&path)?;
            let template: RotationTemplate = match serde_json::from_slice(&data) {
                Ok(t) => t,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable template");
                    continue;
                }
            };
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            infos.push(TemplateInfo {
                template,
                path,
                modified,
            });
        }
        infos.sort_by(|a, b| a.template.id.cmp(&b.template.id));
        Ok(infos)
    }
}

pub fn load_template_from_file<P: AsRef<Path>>(path: P) -> Result<RotationTemplate> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading template {}", path.display()))?;
    let template: RotationTemplate =
        serde_json::from_slice(&data).with_context(|| format!("parsing template {}", path.display()))?;
    template.validate()?;
    Ok(template)
}
