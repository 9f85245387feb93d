//! Argument-string splitting for the non-shell runner form.
//!
//! Callers hand the runner a single argument string such as
//! `ssh m1.swarm.local 'sudo mv /tmp/*.pem /etc/docker/'`. Words are split on
//! whitespace; a single- or double-quoted section is kept together as part of
//! one word with its quotes removed. There are no escape sequences.

/// Split `input` into argv words.
pub fn split_args(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
