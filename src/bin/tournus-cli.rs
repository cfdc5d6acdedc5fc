#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "csv")]
use tournus::io;
use tournus::{
    autopilot_all, autopilot_rotation,
    forecast::{forecast_rotation, forecast_user, guess, Snapshot},
    load_template_from_file, Directory, Level, Need, Outbox, PersonId, PlanError, Planner, RotationId,
    StaticDirectory, Storage, StoreError,
};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

const IDENTITIES: &str = "index/identities";

/// CLI de rotations de garde (stockage JSON local)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Répertoire de stockage
    #[arg(long, global = true, default_value = "tournus-data")]
    store: String,

    /// Instant de référence (RFC3339 UTC), défaut : maintenant
    #[arg(long, global = true)]
    now: Option<String>,

    /// Graine des tirages (reproductibilité)
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Créer une rotation depuis un template JSON
    RotationCreate {
        #[arg(long)]
        template: String,
    },

    /// Lister les rotations connues
    RotationList,

    /// Afficher une rotation
    RotationShow {
        #[arg(long)]
        rotation: String,
    },

    /// Archiver une rotation
    RotationArchive {
        #[arg(long)]
        rotation: String,
    },

    /// Ajouter des membres ("handle1,handle2,...")
    RotationJoin {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        users: String,
        /// Shift de référence pour l'ancienneté (défaut : shift courant)
        #[arg(long)]
        from_shift: Option<i64>,
    },

    /// Retirer des membres
    RotationLeave {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        users: String,
    },

    /// Ajouter ou remplacer un besoin
    NeedAdd {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        skill: String,
        #[arg(long)]
        level: String,
        #[arg(long, default_value_t = 1)]
        min: u32,
        /// -1 : illimité
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        max: i64,
    },

    /// Importer des personnes depuis un CSV
    #[cfg(feature = "csv")]
    ImportPeople {
        #[arg(long)]
        csv: String,
    },

    /// Définir le niveau d'une compétence
    SkillSet {
        #[arg(long)]
        user: String,
        #[arg(long)]
        skill: String,
        #[arg(long)]
        level: String,
    },

    /// Déclarer une indisponibilité (RFC3339 UTC)
    Unavailable {
        #[arg(long)]
        user: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },

    ShiftOpen {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        number: i64,
    },

    ShiftJoin {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        number: i64,
        #[arg(long)]
        users: String,
    },

    /// Compléter un shift ouvert
    ShiftFill {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        number: i64,
    },

    ShiftStart {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        number: i64,
    },

    ShiftFinish {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        number: i64,
    },

    /// Simuler les prochains shifts sans rien persister
    Guess {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        from: Option<i64>,
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[cfg(feature = "csv")]
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Prévision Monte-Carlo
    Forecast {
        #[arg(long)]
        rotation: String,
        #[arg(long)]
        from: Option<i64>,
        #[arg(long, default_value_t = 4)]
        count: usize,
        #[arg(long, default_value_t = 100)]
        samples: usize,
        /// Restreindre à une personne (probabilité cumulée)
        #[arg(long)]
        user: Option<String>,
        #[cfg(feature = "csv")]
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Exécuter le pilote automatique (une rotation ou toutes)
    Autopilot {
        #[arg(long)]
        rotation: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    let now: DateTime<Utc> = match &cli.now {
        Some(raw) => raw.parse().with_context(|| format!("invalid --now: {raw}"))?,
        None => Utc::now(),
    };
    let seed = cli.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let storage = tournus::JsonStorage::open(&cli.store)?;
    let mut directory = load_directory(&storage)?;
    let outbox = Outbox::new();

    let code = {
        let names = directory.clone();
        let mut planner = Planner::new(&storage, &outbox, &names);
        match cli.cmd {
            Commands::RotationCreate { template } => {
                let template = load_template_from_file(&template)?;
                let rotation = planner.add_rotation(template.to_rotation()?)?;
                println!("created rotation {} ({})", rotation.id, rotation.name);
                0
            }
            Commands::RotationList => {
                for (id, name) in planner.list_rotations()? {
                    println!("{id} | {name}");
                }
                0
            }
            Commands::RotationShow { rotation } => {
                let rotation = planner.load_rotation(&RotationId::new(rotation))?;
                let current = rotation.shift_number_for_time(now);
                println!("{} | {} | {} from {}", rotation.id, rotation.name, rotation.period, rotation.start);
                println!("size {} | grace {} | current shift {current}", rotation.size, rotation.grace);
                for need in &rotation.needs {
                    println!("need {need}");
                }
                let members: Vec<String> = rotation
                    .members
                    .iter()
                    .map(|id| directory.display_name(id))
                    .collect();
                println!("members: {}", members.join(", "));
                0
            }
            Commands::RotationArchive { rotation } => {
                planner.archive_rotation(&RotationId::new(rotation))?;
                0
            }
            Commands::RotationJoin {
                rotation,
                users,
                from_shift,
            } => {
                let id = RotationId::new(rotation);
                let from = match from_shift {
                    Some(n) => n,
                    None => planner.load_rotation(&id)?.shift_number_for_time(now).max(0),
                };
                let people = resolve_people(&directory, &users);
                planner.add_members(&id, &people, from)?;
                0
            }
            Commands::RotationLeave { rotation, users } => {
                let people = resolve_people(&directory, &users);
                planner.remove_members(&RotationId::new(rotation), &people)?;
                0
            }
            Commands::NeedAdd {
                rotation,
                skill,
                level,
                min,
                max,
            } => {
                let level: Level = level.parse().map_err(anyhow::Error::msg)?;
                let need = Need::from_counts(skill, level, min, max).map_err(anyhow::Error::msg)?;
                planner.add_need(&RotationId::new(rotation), need)?;
                0
            }
            #[cfg(feature = "csv")]
            Commands::ImportPeople { csv } => {
                let rows = io::import_people_csv(csv)?;
                for row in rows {
                    for (skill, level) in &row.skills {
                        planner.set_skill(&row.identity.id, skill, *level)?;
                    }
                    directory.upsert(row.identity);
                }
                0
            }
            Commands::SkillSet { user, skill, level } => {
                let level: Level = level.parse().map_err(anyhow::Error::msg)?;
                planner.set_skill(&resolve_person(&directory, &user), &skill, level)?;
                0
            }
            Commands::Unavailable { user, start, end } => {
                let start = start.parse().context("start RFC3339")?;
                let end = end.parse().context("end RFC3339")?;
                planner.add_unavailable(&resolve_person(&directory, &user), start, end)?;
                0
            }
            Commands::ShiftOpen { rotation, number } => {
                let shift = planner.open_shift(&RotationId::new(rotation), number)?;
                println!("opened shift {} ({} → {})", shift.number, shift.start, shift.end);
                0
            }
            Commands::ShiftJoin {
                rotation,
                number,
                users,
            } => {
                let people = resolve_people(&directory, &users);
                let outcome = planner.join_shift(&RotationId::new(rotation), number, &people)?;
                for skipped in &outcome.skipped {
                    println!("{} already in shift {number}", directory.display_name(skipped));
                }
                0
            }
            Commands::ShiftFill { rotation, number } => {
                match planner.fill_shift(&RotationId::new(rotation), number, &mut rng) {
                    Ok(outcome) => {
                        let added: Vec<String> = outcome.added.iter().map(|id| directory.display_name(id)).collect();
                        println!("added: {}", added.join(", "));
                        0
                    }
                    Err(PlanError::Allocation(err)) => {
                        eprintln!("autofill failed: {err}");
                        2
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Commands::ShiftStart { rotation, number } => {
                let t = planner.start_shift(&RotationId::new(rotation), number)?;
                if !t.changed {
                    println!("shift {number} already started");
                }
                0
            }
            Commands::ShiftFinish { rotation, number } => {
                let t = planner.finish_shift(&RotationId::new(rotation), number)?;
                if !t.changed {
                    println!("shift {number} already finished");
                }
                0
            }
            Commands::Guess {
                rotation,
                from,
                count,
                #[cfg(feature = "csv")]
                out_csv,
            } => {
                let id = RotationId::new(rotation);
                let from = match from {
                    Some(n) => n,
                    None => planner.load_rotation(&id)?.shift_number_for_time(now).max(0),
                };
                let snapshot = Snapshot::load(&mut planner, &id, from, count)?;
                match guess(&snapshot, from, count, true, &mut rng) {
                    Ok(shifts) => {
                        let shifts: Vec<_> = shifts.into_iter().flatten().collect();
                        for s in &shifts {
                            let members: Vec<String> = s.members.iter().map(|id| directory.display_name(id)).collect();
                            println!("{} | {} → {} | {}", s.number, s.start.date_naive(), s.end.date_naive(), members.join(", "));
                        }
                        #[cfg(feature = "csv")]
                        if let Some(path) = out_csv {
                            io::export_shifts_csv(path, &shifts)?;
                        }
                        0
                    }
                    Err(err) => {
                        eprintln!("guess failed: {err}");
                        2
                    }
                }
            }
            Commands::Forecast {
                rotation,
                from,
                count,
                samples,
                user,
                #[cfg(feature = "csv")]
                out_csv,
            } => {
                let id = RotationId::new(rotation);
                let from = match from {
                    Some(n) => n,
                    None => planner.load_rotation(&id)?.shift_number_for_time(now).max(0),
                };
                let snapshot = Snapshot::load(&mut planner, &id, from, count)?;
                if let Some(user) = user {
                    let person = resolve_person(&directory, &user);
                    let f = forecast_user(&snapshot, &person, from, count, samples, seed);
                    for (offset, p) in f.cumulative.iter().enumerate() {
                        println!("shift {} | {:.1}%", from + offset as i64, p * 100.0);
                    }
                    if f.successes < samples { 2 } else { 0 }
                } else {
                    let f = forecast_rotation(&snapshot, from, count, samples, seed);
                    println!("{} of {} trials succeeded", f.successes, f.sample_size);
                    for (kind, stats) in &f.failures {
                        let needs: Vec<String> = stats.needs.iter().map(|(k, n)| format!("{k} x{n}")).collect();
                        println!("{kind}: {} ({})", stats.count, needs.join(", "));
                    }
                    for (person, freqs) in &f.selections {
                        let cells: Vec<String> = freqs.iter().map(|p| format!("{:5.1}%", p * 100.0)).collect();
                        println!("{:<20} {}", directory.display_name(person), cells.join(" "));
                    }
                    #[cfg(feature = "csv")]
                    if let Some(path) = out_csv {
                        io::export_forecast_csv(path, &f)?;
                    }
                    if f.failures.is_empty() { 0 } else { 2 }
                }
            }
            Commands::Autopilot { rotation } => {
                let reports = match rotation {
                    Some(id) => {
                        let id = RotationId::new(id);
                        let report = autopilot_rotation(&mut planner, &id, now, &mut rng);
                        vec![(id, report)]
                    }
                    None => autopilot_all(&mut planner, now, &mut rng)?,
                };
                let mut code = 0;
                for (id, report) in reports {
                    match report {
                        Ok(report) => {
                            println!("{report}");
                            if report.has_failures() {
                                code = 2;
                            }
                        }
                        Err(err) => {
                            eprintln!("{id}: {err}");
                            code = 2;
                        }
                    }
                }
                code
            }
        }
    };

    for (person, message) in outbox.drain() {
        println!("→ {}: {message}", directory.display_name(&person));
    }
    save_directory(&storage, &directory)?;

    std::process::exit(code);
}

fn load_directory(storage: &dyn Storage) -> Result<StaticDirectory> {
    match storage.get(IDENTITIES) {
        Ok(data) => serde_json::from_slice(&data).context("parsing identities"),
        Err(StoreError::NotFound(_)) => Ok(StaticDirectory::default()),
        Err(err) => Err(err.into()),
    }
}

fn save_directory(storage: &dyn Storage, directory: &StaticDirectory) -> Result<()> {
    let json = serde_json::to_vec_pretty(directory)?;
    storage.set(IDENTITIES, &json)?;
    Ok(())
}

fn resolve_person(directory: &StaticDirectory, raw: &str) -> PersonId {
    directory
        .get_person_by_handle(raw.trim())
        .map(|identity| identity.id)
        .unwrap_or_else(|_| PersonId::new(raw.trim()))
}

fn resolve_people(directory: &StaticDirectory, list: &str) -> Vec<PersonId> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| resolve_person(directory, s))
        .collect()
}
