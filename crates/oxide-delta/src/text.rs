//! Text helpers.

/// Removes the leading whitespace shared by every non-blank line.
///
/// Blank lines do not count toward the shared indentation.
#[must_use]
pub fn undent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    if indent == 0 {
        return text.to_string();
    }

    let mut out: Vec<&str> = text
        .split('\n')
        .map(|line| {
            let strip = line
                .char_indices()
                .take(indent)
                .take_while(|(_, c)| *c == ' ' || *c == '\t')
                .count();
            &line[strip..]
        })
        .collect();
    // Keep a trailing newline if there was one.
    if text.ends_with('\n') {
        out.pop();
        return format!("{}\n", out.join("\n"));
    }
    out.join("\n")
}
