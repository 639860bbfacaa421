use crate::error::HeaderError;

/// Name and parameter list of a `.method` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    pub name: String,
    pub parameters: Vec<String>,
}

/// The declaration following `.method`, if the line is a method header
pub fn method_declaration(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(super::METHOD_START)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Parse `name(p1, p2, ...)`
pub fn parse_method_header(declaration: &str) -> Result<MethodHeader, HeaderError> {
    let (raw_name, rest) = declaration
        .split_once('(')
        .ok_or(HeaderError::MissingOpenParen)?;
    let (raw_parameters, trailing) = rest.split_once(')').ok_or(HeaderError::MissingCloseParen)?;

    let trailing = trailing.trim();
    if !trailing.is_empty() {
        return Err(HeaderError::TrailingCharacters(trailing.to_string()));
    }

    let name = raw_name.trim();
    if name.is_empty() {
        return Err(HeaderError::MissingName);
    }

    let parameters = if raw_parameters.trim().is_empty() {
        Vec::new()
    } else {
        raw_parameters
            .split(',')
            .map(|parameter| parameter.trim().to_string())
            .collect()
    };

    Ok(MethodHeader {
        name: name.to_string(),
        parameters,
    })
}
