/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "courses",
    aliases: &["c", "course"],
    description: "Pick a course",
  },
  Command {
    name: "assignments",
    aliases: &["a", "assignment"],
    description: "Assignments of the current course",
  },
  Command {
    name: "lectures",
    aliases: &["l", "lecture"],
    description: "Lectures of the current course",
  },
  Command {
    name: "notifications",
    aliases: &["n", "inbox"],
    description: "Your notifications",
  },
  Command {
    name: "users",
    aliases: &["u", "pending"],
    description: "Accounts waiting for approval (admin)",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit omniwise",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_priority(cmd, &input_lower).map(|p| (cmd, p)))
    .collect();

  // Stable, so equal priorities keep declaration order
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` when the command does not match at all.
fn match_priority(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("lectures");
    assert_eq!(suggestions[0].name, "lectures");
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("a")[0].name, "assignments");
    assert_eq!(get_suggestions("pending")[0].name, "users");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("not");
    assert_eq!(suggestions[0].name, "notifications");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("ture");
    assert_eq!(suggestions[0].name, "lectures");
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("xyz").is_empty());
  }
}
