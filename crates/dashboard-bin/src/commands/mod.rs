//! Command handlers.

pub mod auth;
pub mod keys;
pub mod profile;

use crate::app::CommandResult;
use serde::Serialize;
use ymir::RegistrationPayload;

/// Pretty-print `value` as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> CommandResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Profile fields accepted by `signup` and `complete-profile`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RegistrationArgs {
    /// Full name
    #[arg(long)]
    pub name: Option<String>,
    /// Birth date (YYYY-MM-DD)
    #[arg(long)]
    pub birth_date: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub profession: Option<String>,
    #[arg(long)]
    pub gender: Option<String>,
    /// Height in centimetres
    #[arg(long)]
    pub height: Option<f64>,
    /// Weight in kilograms
    #[arg(long)]
    pub weight: Option<f64>,
    #[arg(long)]
    pub activity_level: Option<String>,
    /// Health goal (repeatable)
    #[arg(long = "goal")]
    pub goals: Vec<String>,
    /// Dietary restriction (repeatable)
    #[arg(long = "restriction")]
    pub restrictions: Vec<String>,
}

impl From<RegistrationArgs> for RegistrationPayload {
    fn from(args: RegistrationArgs) -> Self {
        RegistrationPayload {
            full_name: args.name,
            birth_date: args.birth_date,
            phone: args.phone,
            profession: args.profession,
            gender: args.gender,
            height: args.height,
            weight: args.weight,
            activity_level: args.activity_level,
            health_goals: args.goals,
            dietary_restrictions: args.restrictions,
        }
    }
}
