use crate::forecast::Forecast;
use crate::identity::Identity;
use crate::model::{Level, PersonId, Shift};
use anyhow::{bail, Context};
use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

/// Ligne d'import : identité et compétences d'une personne.
#[derive(Debug, Clone)]
pub struct PersonRow {
    pub identity: Identity,
    pub skills: Vec<(String, Level)>,
}

/// Import de personnes depuis CSV: header `id,handle,display_name[,skills]`
/// avec `skills` de la forme `server:3;webapp:beginner`.
pub fn import_people_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<PersonRow>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = rec.get(0).context("missing id")?.trim();
        let handle = rec.get(1).context("missing handle")?.trim();
        let display = rec.get(2).context("missing display_name")?.trim();
        if id.is_empty() || handle.is_empty() {
            bail!("invalid people row (empty)");
        }
        let display = if display.is_empty() { handle } else { display };
        let skills = match rec.get(3).map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                parse_skills(raw).with_context(|| format!("invalid skills value for {handle}"))?
            }
            _ => Vec::new(),
        };
        out.push(PersonRow {
            identity: Identity::new(PersonId::new(id), handle, display),
            skills,
        });
    }
    Ok(out)
}

fn parse_skills(raw: &str) -> anyhow::Result<Vec<(String, Level)>> {
    raw.split(';')
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| -> anyhow::Result<(String, Level)> {
            let (skill, level) = chunk
                .trim()
                .split_once(':')
                .with_context(|| format!("expected skill:level, got {chunk}"))?;
            let skill = skill.trim();
            if skill.is_empty() {
                bail!("empty skill name");
            }
            let level: Level = level.parse().map_err(anyhow::Error::msg)?;
            Ok((skill.to_string(), level))
        })
        .collect()
}

/// Export CSV d'une prévision: header `person,shift,probability`
pub fn export_forecast_csv<P: AsRef<Path>>(path: P, forecast: &Forecast) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record(["person", "shift", "probability"])?;
    for (person, freqs) in &forecast.selections {
        for (offset, freq) in freqs.iter().enumerate() {
            let shift = (forecast.from + offset as i64).to_string();
            let freq = format!("{freq:.4}");
            w.write_record([person.as_str(), shift.as_str(), freq.as_str()])?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Export CSV de shifts: header `shift,start,end,status,members`
pub fn export_shifts_csv<P: AsRef<Path>>(path: P, shifts: &[Shift]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record(["shift", "start", "end", "status", "members"])?;
    for s in shifts {
        let members: Vec<&str> = s.members.iter().map(PersonId::as_str).collect();
        w.write_record([
            s.number.to_string(),
            s.start.format("%Y-%m-%d").to_string(),
            s.end.format("%Y-%m-%d").to_string(),
            s.status.to_string(),
            members.join(";"),
        ])?;
    }
    w.flush()?;
    Ok(())
}
