/// Available commands and autocomplete logic

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "market",
    aliases: &["m", "markets", "home"],
    description: "Market overview",
  },
  Command {
    name: "trending",
    aliases: &["t", "trend"],
    description: "Trending coins",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    description: "Drop cached data and refetch",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit coinpulse",
  },
];

/// Match quality of `input` against a command; lower is better.
fn match_rank(cmd: &Command, input: &str) -> Option<u8> {
  let aliases = || cmd.aliases.iter();
  if cmd.name == input {
    Some(0)
  } else if aliases().any(|a| *a == input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if aliases().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if aliases().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input).map(|rank| (cmd, rank)))
    .collect();
  // Stable sort keeps table order among equal ranks
  matches.sort_by_key(|(_, rank)| *rank);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
