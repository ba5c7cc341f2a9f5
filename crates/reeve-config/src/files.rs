//! Detection of well-known files in a repository root.

use reeve_core::repository::FileEntry;
use std::cmp::Ordering;

/// Base name of the configuration entrypoint.
pub const CONFIG_BASE_NAME: &str = ".reeve";

/// Recognized configuration file suffixes, in entrypoint priority order.
pub const CONFIG_EXTENSIONS: [&str; 4] = [".yaml", ".yml", ".yaml.tmpl", ".yml.tmpl"];

const TEMPLATE_SUFFIX: &str = ".tmpl";

const README_STEM: &str = "readme";

/// README extensions in preference order; any other extension ranks last.
const README_EXTENSIONS: [&str; 3] = [".md", ".txt", ""];

/// Whether `file` must be rendered as a template before decoding.
pub fn is_template(file: &str) -> bool {
    file.ends_with(TEMPLATE_SUFFIX)
}

/// Whether `file` carries one of the recognized configuration suffixes.
pub fn has_config_extension(file: &str) -> bool {
    CONFIG_EXTENSIONS.iter().any(|ext| file.ends_with(ext))
}

/// Locate the configuration entrypoint among the root entries.
///
/// Non-templated files are preferred over templated ones, in declared extension order.
pub fn find_entrypoint(entries: &[FileEntry]) -> Option<&FileEntry> {
    CONFIG_EXTENSIONS.iter().find_map(|ext| {
        let wanted = format!("{}{}", CONFIG_BASE_NAME, ext);
        entries.iter().find(|e| e.is_file() && e.name == wanted)
    })
}

/// Locate the README among the root entries.
///
/// `.md` beats `.txt` beats no extension beats any other extension; among
/// candidates of the same rank the naturally latest name wins.
pub fn find_readme(entries: &[FileEntry]) -> Option<&FileEntry> {
    let mut best: Option<(usize, &FileEntry)> = None;

    for entry in entries.iter().filter(|e| e.is_file()) {
        let Some(rank) = readme_rank(&entry.name) else {
            continue;
        };

        let better = match best {
            None => true,
            Some((best_rank, current)) => {
                rank < best_rank
                    || (rank == best_rank && natural_cmp(&current.name, &entry.name) == Ordering::Less)
            }
        };
        if better {
            best = Some((rank, entry));
        }
    }

    best.map(|(_, entry)| entry)
}

/// Rank of a README candidate, or `None` if `name` is not a README.
fn readme_rank(name: &str) -> Option<usize> {
    let lower = name.to_lowercase();
    let rest = lower.strip_prefix(README_STEM)?;

    if let Some(rank) = README_EXTENSIONS.iter().position(|ext| rest == *ext) {
        return Some(rank);
    }

    rest.starts_with('.').then_some(README_EXTENSIONS.len())
}

/// Compare two names in natural order: case-insensitive, digit runs compared numerically.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_digits = take_digits(&mut left);
                let r_digits = take_digits(&mut right);
                let l_trimmed = l_digits.trim_start_matches('0');
                let r_trimmed = r_digits.trim_start_matches('0');

                let ordering = l_trimmed
                    .len()
                    .cmp(&r_trimmed.len())
                    .then_with(|| l_trimmed.cmp(r_trimmed));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                let ordering = l.to_lowercase().cmp(r.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}
