//! ============================================================================
//! Spoken Prompts
//! ============================================================================
//! Fixed French wording for every branch of the call flow. Centralized so
//! the state machine and its tests agree on the exact text.
//! ============================================================================

use crate::types::LockAction;

/// Entry greeting, played once the actuator accepted the call metadata.
pub const GREETING: &str = "Bienvenue à la conciergerie.";

/// Main menu prompt.
pub const MENU: &str =
    "Appuyez sur 1 pour déverrouiller la porte, ou sur 2 pour la verrouiller.";

/// Played when the caller pressed nothing at the menu.
pub const NO_INPUT: &str = "Aucune sélection reçue.";

/// Played for any digit outside the menu, then the call ends.
pub const OPTION_NOT_RECOGNIZED: &str = "Option non reconnue. Au revoir.";

/// The `action` parameter on the request step was not 1 or 2.
pub const ACTION_NOT_RECOGNIZED: &str = "Action non reconnue. Au revoir.";

/// The actuator accepted the action; the caller waits for the result.
pub const COMMAND_SENT: &str = "Commande envoyée, veuillez patienter.";

/// Progress message during the poll loop.
pub const WAITING: &str = "L'opération est en cours, veuillez patienter.";

/// Generic apology for dispatch failures and malformed callbacks.
pub const GENERIC_APOLOGY: &str =
    "Désolé, une erreur est survenue. Veuillez rappeler plus tard.";

/// The poll budget ran out without a result.
pub const LOCK_NOT_RESPONDING: &str =
    "La serrure ne répond pas. Veuillez contacter le responsable.";

/// Non-jam failure reported by the actuator backend.
pub const OPERATION_FAILED: &str =
    "L'opération a échoué. Veuillez réessayer plus tard.";

/// Jammed motor, one retry left.
pub const JAM_RETRY: &str =
    "La serrure semble bloquée, nouvelle tentative en cours.";

/// Jammed motor after the retry.
pub const JAM_FINAL: &str =
    "La serrure est bloquée. Veuillez contacter le responsable.";

/// Confirmation right after the caller picked a menu option.
pub fn choice_confirmed(action: LockAction) -> &'static str {
    match action {
        LockAction::Unlock => "Vous avez choisi de déverrouiller la porte.",
        LockAction::Lock => "Vous avez choisi de verrouiller la porte.",
    }
}

/// Closing message for a successful actuation. When the actuator did not
/// echo the action back, a neutral wording is used.
pub fn operation_succeeded(action: Option<LockAction>) -> &'static str {
    match action {
        Some(LockAction::Unlock) => "La porte est déverrouillée. Au revoir.",
        Some(LockAction::Lock) => "La porte est verrouillée. Au revoir.",
        None => "L'opération a réussi. Au revoir.",
    }
}

/// Spoken version report.
pub fn version_report(tag: &str) -> String {
    format!("Version {}.", tag)
}
