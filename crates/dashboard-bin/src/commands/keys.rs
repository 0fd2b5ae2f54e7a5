//! Stored API credential commands.

use crate::app::{AppState, CommandError, CommandResult};
use crate::commands::print_json;

pub fn set(state: &AppState, name: &str, value: &str) -> CommandResult<()> {
    if !state.key_store.set(name, value) {
        return Err(CommandError::Usage(format!(
            "Could not store credential '{}'. Name and value must not be empty.",
            name
        )));
    }
    println!("Stored '{}'.", name);
    Ok(())
}

/// Prints the value, or exits with an error when absent.
pub fn get(state: &AppState, name: &str) -> CommandResult<()> {
    match state.key_store.get(name) {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => Err(CommandError::Usage(format!("No credential named '{}'.", name))),
    }
}

pub fn has(state: &AppState, name: &str) -> CommandResult<()> {
    println!("{}", state.key_store.has(name));
    Ok(())
}

pub fn remove(state: &AppState, name: &str) -> CommandResult<()> {
    if state.key_store.remove(name) {
        println!("Removed '{}'.", name);
    } else {
        println!("'{}' was not stored.", name);
    }
    Ok(())
}

pub fn list(state: &AppState) -> CommandResult<()> {
    print_json(&state.key_store.names())
}
