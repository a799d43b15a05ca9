//! Parsing of console lines into cashier actions.

use std::str::FromStr;

use thiserror::Error;

use loyalty_core::Money;

/// One cashier action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Raw string from the camera.
    Scan(String),
    Enroll,
    Earn,
    Quote(Money),
    Sale { amount: Money, notes: Option<String> },
    Offers,
    Rewards,
    Redeem(String),
    Verify,
    Resubmit,
    Back,
    Cancel,
    Done,
    History,
    Audit,
    State,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    Amount(String),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Err(ParseError::Empty),
            "scan" if !rest.is_empty() => Command::Scan(rest.to_string()),
            "scan" => return Err(ParseError::Usage("scan <code>")),
            "enroll" => Command::Enroll,
            "earn" => Command::Earn,
            "quote" => Command::Quote(amount(rest, "quote <amount>")?),
            "sale" => {
                let (amount_text, notes) = match rest.split_once(char::is_whitespace) {
                    Some((amount_text, notes)) => (amount_text, Some(notes.trim().to_string())),
                    None => (rest, None),
                };
                Command::Sale {
                    amount: amount(amount_text, "sale <amount> [note]")?,
                    notes,
                }
            }
            "offers" => Command::Offers,
            "rewards" => Command::Rewards,
            "redeem" if !rest.is_empty() => Command::Redeem(rest.to_string()),
            "redeem" => return Err(ParseError::Usage("redeem <reward id>")),
            "verify" => Command::Verify,
            "resubmit" => Command::Resubmit,
            "back" => Command::Back,
            "cancel" => Command::Cancel,
            "done" => Command::Done,
            "history" => Command::History,
            "audit" => Command::Audit,
            "state" => Command::State,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn amount(text: &str, usage: &'static str) -> Result<Money, ParseError> {
    if text.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    text.parse::<Money>()
        .map_err(|err| ParseError::Amount(err.to_string()))
}

pub const HELP: &str = "\
scan <code>          scan a customer code (JSON)
enroll               enroll the scanned customer
earn                 open the earn screen
quote <amount>       preview points for an amount
sale <amount> [note] record a purchase
offers               list the points offers running here
rewards              open the reward catalog
redeem <reward id>   redeem one unit of a reward
verify               check what became of an unanswered commit
resubmit             resend an unanswered commit
back                 back to the customer card
cancel | done        end the session
history              recent transactions of the customer
audit                check balances against the ledger
state                show the current screen
quit                 leave";
