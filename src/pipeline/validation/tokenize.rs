/// Fields of one identifier line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens<'a> {
    pub prefix: Option<&'a str>,
    pub identifier: &'a str,
    pub description: String,
}

impl LineTokens<'_> {
    pub fn digits(&self) -> String {
        self.identifier.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    pub fn digit_count(&self) -> u32 {
        self.identifier.chars().filter(|c| c.is_ascii_digit()).count() as u32
    }
}

/// Split a line into prefix, identifier and description.
///
/// The first field is a prefix when it is purely alphabetic or equals one of
/// `known_prefixes` (ignoring case), so court codes carrying digits still
/// split. Returns `None` for informational lines: blank, or with an identifier
/// that carries no digit.
pub fn tokenize<'a>(line: &'a str, known_prefixes: &[String]) -> Option<LineTokens<'a>> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }

    let (fields, separator): (Vec<&str>, &str) = if line.contains('\t') {
        (line.split('\t').map(str::trim).collect(), "\t")
    } else {
        (line.split_whitespace().collect(), " ")
    };

    let first = *fields.first()?;
    let is_prefix = !first.is_empty()
        && (first.chars().all(char::is_alphabetic)
            || known_prefixes.iter().any(|p| p.eq_ignore_ascii_case(first)));
    let (prefix, id_index) = if is_prefix {
        (Some(first), 1)
    } else {
        (None, 0)
    };

    let identifier = *fields.get(id_index)?;
    if !identifier.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let description = fields
        .get(id_index + 1..)
        .map(|rest| rest.join(separator))
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(LineTokens {
        prefix,
        identifier,
        description,
    })
}

/// Raw lines with 1-based numbers, split on `\n`.
pub fn numbered_lines(text: &str) -> impl Iterator<Item = (u32, &str)> {
    text.split('\n')
        .enumerate()
        .map(|(i, line)| (i as u32 + 1, line.trim_end_matches('\r')))
}
