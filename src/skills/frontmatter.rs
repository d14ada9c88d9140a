use serde::de::DeserializeOwned;

/// Frontmatter plus the body that follows it.
pub struct ParsedDocument<F> {
    pub frontmatter: F,
    pub body: String,
}

/// Split a `---` delimited YAML header from the markdown body.
pub fn parse_frontmatter<F: DeserializeOwned>(content: &str) -> crate::Result<ParsedDocument<F>> {
    let content = content.trim_start_matches('\u{feff}');
    let Some(after_first) = content.strip_prefix("---") else {
        return Err(crate::Error::Skill(
            "SKILL.md must start with YAML frontmatter (---)".to_string(),
        ));
    };

    let end_pos = after_first
        .find("\n---")
        .ok_or_else(|| crate::Error::Skill("Frontmatter not terminated with ---".to_string()))?;

    let frontmatter_str = after_first[..end_pos].trim();
    let body = after_first[end_pos + 4..].trim().to_string();

    let frontmatter: F = serde_yaml_bw::from_str(frontmatter_str)
        .map_err(|e| crate::Error::Skill(format!("Failed to parse frontmatter: {}", e)))?;

    Ok(ParsedDocument { frontmatter, body })
}
