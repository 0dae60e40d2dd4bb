//! Console input parsed into station actions and contact reports

use shared::{ActionCommand, Zone};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Action(ActionCommand),
    /// A hazard touched a zone (no physics layer attached).
    Enter { zone: Zone, hazard: u32 },
    /// A hazard sat inside a zone for `seconds`.
    Stay { zone: Zone, hazard: u32, seconds: f32 },
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
duck | stand | hover | land | aim <deg> | repair <room> | shield <lane> | beam <lane>
enter <zone> <hazard-id> | stay <zone> <hazard-id> <secs> | status | help | quit
zones: tracks head body shield collector repair beam laser";

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse()
        .map_err(|_| format!("'{}' is not a valid {}", word, what))
}

/// Parses a console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "duck" => ConsoleInput::Action(ActionCommand::Duck { down: true }),
        "stand" => ConsoleInput::Action(ActionCommand::Duck { down: false }),
        "hover" => ConsoleInput::Action(ActionCommand::Hover { on: true }),
        "land" => ConsoleInput::Action(ActionCommand::Hover { on: false }),
        "aim" => ConsoleInput::Action(ActionCommand::Aim {
            angle: number(words.next(), "angle")?,
        }),
        "repair" => ConsoleInput::Action(ActionCommand::Repair {
            room: number(words.next(), "room")?,
        }),
        "shield" => ConsoleInput::Action(ActionCommand::Shield {
            lane: number(words.next(), "lane")?,
        }),
        "beam" => ConsoleInput::Action(ActionCommand::Beam {
            lane: number(words.next(), "lane")?,
        }),
        "enter" | "contact" => {
            let zone = words.next().ok_or("missing zone")?.parse()?;
            let hazard = number(words.next(), "hazard id")?;
            ConsoleInput::Enter { zone, hazard }
        }
        "stay" => {
            let zone = words.next().ok_or("missing zone")?.parse()?;
            let hazard = number(words.next(), "hazard id")?;
            let seconds: f32 = number(words.next(), "duration")?;
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(format!(
                    "duration must be a positive number of seconds, got {}",
                    seconds
                ));
            }
            ConsoleInput::Stay {
                zone,
                hazard,
                seconds,
            }
        }
        "status" => ConsoleInput::Status,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };

    Ok(Some(input))
}
