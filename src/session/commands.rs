/// Control words recognised when they make up the whole message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Explain,
    Continue,
    Skip,
    Next,
    Progress,
    Paths,
    /// `None` clears the focus.
    Focus(Option<String>),
}

pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let text = text.strip_prefix('/').unwrap_or(text).trim();
    let lowered = text.to_lowercase();

    let command = match lowered.as_str() {
        "exit" | "quit" | "bye" => Command::Exit,
        "explain" | "learn more" => Command::Explain,
        "continue" => Command::Continue,
        "skip" => Command::Skip,
        "next" => Command::Next,
        "progress" | "stats" => Command::Progress,
        "paths" => Command::Paths,
        _ => {
            if !lowered.starts_with("path ") {
                return None;
            }
            let name = text.get(5..).unwrap_or_default().trim();
            if name.is_empty() {
                return None;
            }
            if name.eq_ignore_ascii_case("all") || name.eq_ignore_ascii_case("none") {
                Command::Focus(None)
            } else {
                Command::Focus(Some(name.to_string()))
            }
        }
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("EXIT"), Some(Command::Exit));
        assert_eq!(parse_command("  /quit "), Some(Command::Exit));
        assert_eq!(parse_command("Learn More"), Some(Command::Explain));
        assert_eq!(parse_command("stats"), Some(Command::Progress));
        assert_eq!(parse_command("next"), Some(Command::Next));
    }

    #[test]
    fn test_focus_keeps_name_case() {
        assert_eq!(
            parse_command("path Quantitative Trading"),
            Some(Command::Focus(Some("Quantitative Trading".into())))
        );
        assert_eq!(parse_command("/path all"), Some(Command::Focus(None)));
        assert_eq!(parse_command("path"), None);
    }

    #[test]
    fn test_answers_are_not_commands() {
        assert_eq!(parse_command("0.25"), None);
        assert_eq!(parse_command("I would exit the trade"), None);
        assert_eq!(parse_command("b"), None);
        assert_eq!(parse_command("more"), None);
        assert_eq!(parse_command("More."), None);
    }
}
