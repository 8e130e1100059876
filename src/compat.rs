//! Compatibility filter
//!
//! Derives which agents can be offered as the next step. The filter
//! only restricts what is offered; it never retro-validates steps that
//! are already in the chain.

use crate::catalog::{Agent, AgentCatalog, DataType};
use crate::pipeline::Pipeline;

/// Selectable-next-agent derivation over a catalog snapshot
pub struct CompatibilityFilter<'a> {
    catalog: &'a AgentCatalog,
}

impl<'a> CompatibilityFilter<'a> {
    pub fn new(catalog: &'a AgentCatalog) -> Self {
        Self { catalog }
    }

    /// Agents selectable as the pipeline's next step
    ///
    /// Empty pipeline: both filters are optional ("any" when absent).
    /// Non-empty: the required input type is fixed to the tail agent's
    /// output type; the output filter still narrows the result.
    pub fn selectable(
        &self,
        pipeline: &Pipeline,
        input_filter: Option<DataType>,
        output_filter: Option<DataType>,
    ) -> Vec<&'a Agent> {
        let required_input = pipeline.output_type().or(input_filter);
        self.catalog
            .iter()
            .filter(|agent| match required_input {
                Some(required) => agent.input_type == required,
                None => true,
            })
            .filter(|agent| match output_filter {
                Some(wanted) => agent.output_type == wanted,
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Agent;

    fn agent(id: &str, input: DataType, output: DataType) -> Agent {
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            input_type: input,
            output_type: output,
            agent_type: "chat".to_string(),
            requires_api_key: false,
            capability: None,
        }
    }

    fn catalog() -> AgentCatalog {
        AgentCatalog::from_agents(vec![
            agent("txt2txt", DataType::Text, DataType::Text),
            agent("txt2img", DataType::Text, DataType::Image),
            agent("img2txt", DataType::Image, DataType::Text),
            agent("img2img", DataType::Image, DataType::Image),
        ])
    }

    fn ids(agents: &[&Agent]) -> Vec<String> {
        let mut v: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        v.sort();
        v
    }

    #[test]
    fn test_empty_pipeline_no_filters_offers_all() {
        let catalog = catalog();
        let filter = CompatibilityFilter::new(&catalog);
        let pipeline = Pipeline::new("svc").unwrap();

        let offered = filter.selectable(&pipeline, None, None);
        assert_eq!(offered.len(), 4);
    }

    #[test]
    fn test_empty_pipeline_honors_both_filters() {
        let catalog = catalog();
        let filter = CompatibilityFilter::new(&catalog);
        let pipeline = Pipeline::new("svc").unwrap();

        let offered = filter.selectable(&pipeline, Some(DataType::Text), Some(DataType::Image));
        assert_eq!(ids(&offered), vec!["txt2img"]);
    }

    #[test]
    fn test_tail_output_fixes_required_input() {
        let catalog = catalog();
        let filter = CompatibilityFilter::new(&catalog);
        let mut pipeline = Pipeline::new("svc").unwrap();
        pipeline.add_step(&catalog, "txt2img").unwrap();

        // Tail outputs image: nothing with text input may be offered.
        let offered = filter.selectable(&pipeline, None, None);
        assert_eq!(ids(&offered), vec!["img2img", "img2txt"]);
        assert!(offered.iter().all(|a| a.input_type != DataType::Text));
    }

    #[test]
    fn test_input_filter_ignored_when_pipeline_nonempty() {
        let catalog = catalog();
        let filter = CompatibilityFilter::new(&catalog);
        let mut pipeline = Pipeline::new("svc").unwrap();
        pipeline.add_step(&catalog, "txt2img").unwrap();

        // The user-side input filter cannot override the tail's type.
        let offered = filter.selectable(&pipeline, Some(DataType::Text), None);
        assert!(offered.iter().all(|a| a.input_type == DataType::Image));
    }

    #[test]
    fn test_output_filter_still_narrows_nonempty() {
        let catalog = catalog();
        let filter = CompatibilityFilter::new(&catalog);
        let mut pipeline = Pipeline::new("svc").unwrap();
        pipeline.add_step(&catalog, "txt2img").unwrap();

        let offered = filter.selectable(&pipeline, None, Some(DataType::Text));
        assert_eq!(ids(&offered), vec!["img2txt"]);
    }
}
