//! The registered tool names the planner may reference (§4.2 contract).

pub struct ToolRegistry {
    names: Vec<&'static str>,
}

impl ToolRegistry {
    pub fn with_defaults() -> Self {
        Self {
            names: vec!["search_arxiv", "search_openalex", "fetch_pdf"],
        }
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.names.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_both_search_sources() {
        let registry = ToolRegistry::with_defaults();
        assert!(registry.is_registered("search_arxiv"));
        assert!(registry.is_registered("search_openalex"));
        assert!(!registry.is_registered("search_bogus"));
    }
}
