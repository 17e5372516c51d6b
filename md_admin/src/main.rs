//! Command-line administration for matchday tournaments.
//!
//! Connects to PostgreSQL, checks the actor against the `admins` table and
//! runs one command through `TournamentManager`.

mod config;

use std::sync::Arc;

use anyhow::{Context, Error, anyhow, bail};
use chrono::{DateTime, Utc};
use log::info;
use matchday::{
    AccessControl, Action, ParticipantStatsAggregator, TournamentManager,
    access::PgAdminRegistry,
    db::{Database, PgStore},
    tournament::{
        MatchResult, Stage, Tournament, TournamentConfig, TournamentLifecycle, TournamentState,
    },
};
use pico_args::Arguments;
use rand::{SeedableRng, rngs::StdRng};

use config::AdminConfig;

const HELP: &str = "\
Administer matchday tournaments

USAGE:
  md_admin [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
  migrate                              Create missing tables
  grant USER_ID [--bootstrap]          Add an admin (--bootstrap skips the admin check)
  participant NAME                     Register a participant
  category NAME TEAM...                Create or replace a team category
  create [NAME] [--min N] [--max N] [--playoff N | --no-playoff]
                                       Without NAME the tournament is named after today
  list [--all]                         List active (or all) tournaments
  show ID                              Standings and bracket of a tournament
  join ID NAME                         Add a participant during setup
  category-for ID CATEGORY             Choose the team category
  assign ID NAME TEAM                  Give a team to a participant
  draw ID                              Randomly draw teams for everyone
  start ID                             Complete setup
  submit ID TEAM1 TEAM2 S1:S2 [--extra-time E1:E2] [--penalties P1:P2]
  reset ID INDEX                       Reset a group match
  reset-playoff ID [STAGE INDEX]       Reset the bracket, or one match and all later rounds
  seed ID                              Seed the bracket from a finished group table
  archive ID                           Hide a tournament
  delete ID                            Delete a tournament and withdraw its stats
  sync-stats ID                        Re-apply a completed tournament to careers
  leaderboard                          All-time participant table

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --actor      USER_ID     Acting admin                [default: env MD_ACTOR_ID]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  MD_ACTOR_ID              Acting admin user id
  MD_POINTS_*              Ranking points (WINNER, RUNNER_UP, SEMI_FINALIST, GROUP_BONUS)
  RUST_LOG                 Log level (e.g. info)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let actor: Option<i64> = pargs.opt_value_from_str("--actor")?;
    let Some(command) = pargs.subcommand()? else {
        print!("{HELP}");
        std::process::exit(2);
    };

    env_logger::builder().format_target(false).init();

    let config = AdminConfig::from_env(database_url, actor)?;
    config.validate()?;

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    let pool = Arc::new(db.pool().clone());
    let admins = Arc::new(PgAdminRegistry::new(pool.clone()));
    let manager = TournamentManager::with_store(
        Arc::new(PgStore::new(pool)),
        admins.clone(),
        ParticipantStatsAggregator::new(config.points),
    );
    let actor = config.actor;

    match command.as_str() {
        "migrate" => {
            db.migrate().await?;
            println!("Schema up to date");
        }
        "grant" => {
            let bootstrap = pargs.contains("--bootstrap");
            let user: i64 = pargs.free_from_str()?;
            if !bootstrap {
                admins.authorize(actor, Action::ManageAdmins).await?;
            }
            admins.add_admin(user).await?;
            info!("Actor {} granted admin to {}", actor, user);
            println!("User {user} is now an admin");
        }
        "participant" => {
            let name: String = pargs.free_from_str()?;
            manager.create_participant(actor, &name).await?;
            println!("Registered {name}");
        }
        "category" => {
            let name: String = pargs.free_from_str()?;
            let teams = remaining(pargs)?;
            let category = manager.create_category(actor, &name, teams).await?;
            println!("{} has {} teams", category.name, category.teams.len());
        }
        "create" => {
            let defaults = TournamentConfig::standard("");
            let min = pargs
                .opt_value_from_str("--min")?
                .unwrap_or(defaults.min_participants);
            let max = pargs
                .opt_value_from_str("--max")?
                .unwrap_or(defaults.max_participants);
            let no_playoff = pargs.contains("--no-playoff");
            let playoff: Option<usize> = pargs.opt_value_from_str("--playoff")?;
            let name = match pargs.opt_free_from_str::<String>()? {
                Some(name) => name,
                None => default_name(&manager.list_tournaments(false).await?, Utc::now()),
            };

            let mut tournament_config = TournamentConfig::league(name, min, max);
            if !no_playoff {
                tournament_config = tournament_config.with_playoff(playoff.unwrap_or(4));
            }
            let tournament = manager.create_tournament(actor, tournament_config).await?;
            println!("Created tournament {} ({})", tournament.id, tournament.name);
        }
        "list" => {
            let all = pargs.contains("--all");
            for t in manager.list_tournaments(!all).await? {
                println!(
                    "{:>4}  {:<32} {:<20} {} participants",
                    t.id,
                    t.name,
                    t.state().to_string(),
                    t.participants.len()
                );
            }
        }
        "show" => {
            let id = pargs.free_from_str()?;
            print_tournament(&manager.tournament(id).await?);
        }
        "join" => {
            let id = pargs.free_from_str()?;
            let name: String = pargs.free_from_str()?;
            manager.add_participant(actor, id, &name).await?;
            println!("{name} joined tournament {id}");
        }
        "category-for" => {
            let id = pargs.free_from_str()?;
            let category: String = pargs.free_from_str()?;
            manager.set_team_category(actor, id, &category).await?;
            println!("Tournament {id} uses {category}");
        }
        "assign" => {
            let id = pargs.free_from_str()?;
            let name: String = pargs.free_from_str()?;
            let team: String = pargs.free_from_str()?;
            manager.assign_team(actor, id, &name, &team).await?;
            println!("{name} plays with {team}");
        }
        "draw" => {
            let id = pargs.free_from_str()?;
            let mut rng = StdRng::from_os_rng();
            for (participant, team) in manager.draw_teams(actor, id, &mut rng).await? {
                println!("{participant:<20} {team}");
            }
        }
        "start" => {
            let id = pargs.free_from_str()?;
            manager.complete_setup(actor, id).await?;
            println!("Tournament {id} group stage is open");
        }
        "submit" => {
            let extra: Option<String> = pargs.opt_value_from_str("--extra-time")?;
            let penalties: Option<String> = pargs.opt_value_from_str("--penalties")?;
            let id = pargs.free_from_str()?;
            let team1: String = pargs.free_from_str()?;
            let team2: String = pargs.free_from_str()?;
            let score: String = pargs.free_from_str()?;

            let (s1, s2) = parse_score(&score)?;
            let mut result = MatchResult::new(team1, team2, s1, s2);
            if let Some(extra) = extra {
                let (e1, e2) = parse_score(&extra)?;
                result = result.after_extra_time(e1, e2);
            }
            if let Some(penalties) = penalties {
                let (p1, p2) = parse_score(&penalties)?;
                result = result.with_penalties(p1, p2);
            }

            let current = manager.tournament(id).await?;
            let tournament = match current.state() {
                TournamentState::Playoff => {
                    let stage = current.playoff.current_stage;
                    manager.submit_playoff_match(actor, id, stage, result).await?
                }
                _ => manager.submit_group_match(actor, id, result).await?,
            };
            print_tournament(&tournament);
        }
        "reset" => {
            let id = pargs.free_from_str()?;
            let index = pargs.free_from_str()?;
            manager.reset_group_match(actor, id, index).await?;
            println!("Group match #{index} of tournament {id} reset");
        }
        "reset-playoff" => {
            let id = pargs.free_from_str()?;
            let stage: Option<String> = pargs.opt_free_from_str()?;
            match stage {
                Some(stage) => {
                    let stage = parse_stage(&stage)?;
                    let index = pargs.free_from_str()?;
                    manager.reset_playoff_from(actor, id, stage, index).await?;
                    println!("Bracket of tournament {id} rewound to the {stage}");
                }
                None => {
                    manager.reset_playoff(actor, id).await?;
                    println!("Bracket of tournament {id} cleared");
                }
            }
        }
        "seed" => {
            let id = pargs.free_from_str()?;
            let tournament = manager.start_playoff(actor, id).await?;
            println!(
                "Tournament {id} playoff opens in the {}",
                tournament.playoff.current_stage
            );
        }
        "archive" => {
            let id = pargs.free_from_str()?;
            manager.set_active(actor, id, false).await?;
            println!("Tournament {id} archived");
        }
        "delete" => {
            let id = pargs.free_from_str()?;
            manager.delete_tournament(actor, id).await?;
            println!("Tournament {id} deleted");
        }
        "sync-stats" => {
            let id = pargs.free_from_str()?;
            manager.sync_participant_stats(actor, id).await?;
            println!("Careers up to date with tournament {id}");
        }
        "leaderboard" => {
            for entry in manager.leaderboard().await? {
                println!(
                    "{:>3}. {:<20} {:>4} pts  {:>3} played  {}W {}D {}L  {:+}",
                    entry.rank,
                    entry.name,
                    entry.total_points,
                    entry.tournaments_played,
                    entry.wins,
                    entry.draws,
                    entry.losses,
                    entry.goals_difference
                );
            }
        }
        other => bail!("Unknown command '{other}', see --help"),
    }

    db.close().await;
    Ok(())
}

fn remaining(pargs: Arguments) -> Result<Vec<String>, Error> {
    pargs
        .finish()
        .into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|raw| anyhow!("Argument is not valid UTF-8: {raw:?}"))
        })
        .collect()
}

/// Parse `"2:1"` into `(2, 1)`
fn parse_score(raw: &str) -> Result<(i32, i32), Error> {
    let (left, right) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Score '{raw}' must look like 2:1"))?;
    let left = left.trim().parse().context("Invalid score")?;
    let right = right.trim().parse().context("Invalid score")?;
    Ok((left, right))
}

fn parse_stage(raw: &str) -> Result<Stage, Error> {
    match raw.to_lowercase().as_str() {
        "qf" | "quarter-finals" | "quarter_finals" => Ok(Stage::QuarterFinals),
        "sf" | "semi-finals" | "semi_finals" => Ok(Stage::SemiFinals),
        "f" | "final" => Ok(Stage::Final),
        _ => Err(anyhow!("Unknown stage '{raw}' (use qf, sf or final)")),
    }
}

fn print_tournament(t: &Tournament) {
    println!("#{} {} ({})", t.id, t.name, t.state());
    println!(
        "    {:<20} {:>2} {:>2} {:>2} {:>2} {:>3}:{:<3} {:>4} {:>3}",
        "Team", "P", "W", "D", "L", "GF", "GA", "GD", "Pts"
    );
    for (i, row) in t.standings.iter().enumerate() {
        println!(
            "{:>2}. {:<20} {:>2} {:>2} {:>2} {:>2} {:>3}:{:<3} {:>+4} {:>3}",
            i + 1,
            row.team,
            row.played,
            row.won,
            row.drawn,
            row.lost,
            row.goals_for,
            row.goals_against,
            row.goals_difference,
            row.points
        );
    }

    for stage in [Stage::QuarterFinals, Stage::SemiFinals, Stage::Final] {
        let matches = t.playoff.matches(stage);
        if matches.is_empty() {
            continue;
        }
        println!("{stage}:");
        for m in matches {
            let score = match (m.score1, m.score2) {
                (Some(s1), Some(s2)) => match (m.penalty_score1, m.penalty_score2) {
                    (Some(p1), Some(p2)) => format!("{s1}:{s2} ({p1}:{p2} pen.)"),
                    _ => format!("{s1}:{s2}"),
                },
                _ => "-:-".to_string(),
            };
            println!("    {} {} {}", m.team1, score, m.team2);
        }
    }
    if let Some(champion) = TournamentLifecycle::champion(t) {
        println!("Winner: {champion}");
    }
}

/// `"<date> Tournament #n"`, counting tournaments already created that day
fn default_name(existing: &[Tournament], now: DateTime<Utc>) -> String {
    let today = existing
        .iter()
        .filter(|t| t.created_at.date_naive() == now.date_naive())
        .count();
    TournamentConfig::dated_name(now, today as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("2:1").unwrap(), (2, 1));
        assert_eq!(parse_score(" 0 : 0 ").unwrap(), (0, 0));
        assert!(parse_score("2-1").is_err());
        assert!(parse_score("a:1").is_err());
    }

    #[test]
    fn test_default_name_counts_todays_tournaments() {
        let now = Utc::now();
        let yesterday = now - chrono::Duration::days(1);
        let existing = vec![
            Tournament::new(1, TournamentConfig::standard("Old"), yesterday),
            Tournament::new(2, TournamentConfig::standard("Morning"), now),
        ];
        assert_eq!(
            default_name(&existing, now),
            format!("{} Tournament #2", now.format("%Y-%m-%d"))
        );
        assert!(default_name(&[], now).ends_with("Tournament #1"));
    }

    #[test]
    fn test_parse_stage() {
        assert_eq!(parse_stage("SF").unwrap(), Stage::SemiFinals);
        assert_eq!(parse_stage("final").unwrap(), Stage::Final);
        assert!(parse_stage("group").is_err());
    }
}
