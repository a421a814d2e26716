use crate::community_reports_errors::CommunityReportError;
use crate::graph::knowledge_graph::KnowledgeGraph;

/// Upper bound on relation rows per community. Pair enumeration is quadratic in community
/// size, so very large communities only get partial relation coverage.
pub const MAX_RELATION_PAIRS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RelationPair {
    pub source: String,
    pub target: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTables {
    pub entity_table: String,
    pub relation_table: String,
    pub relation_count: usize,
}

/// Walks unordered entity pairs in list order and keeps those joined by an edge.
pub fn collect_relation_pairs(entities: &[String], graph: &KnowledgeGraph) -> Vec<RelationPair> {
    let mut pairs = Vec::new();
    'outer: for (i, source) in entities.iter().enumerate() {
        for target in &entities[i + 1..] {
            if pairs.len() >= MAX_RELATION_PAIRS {
                break 'outer;
            }
            if let Some(edge) = graph.edge(source, target) {
                pairs.push(RelationPair {
                    source: source.clone(),
                    target: target.clone(),
                    description: edge.description.clone(),
                });
            }
        }
    }
    pairs
}

fn write_table<I>(header: &[&str], rows: I) -> Result<String, CommunityReportError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for (row_id, row) in rows.into_iter().enumerate() {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(row_id.to_string());
        record.extend(row);
        writer.write_record(&record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CommunityReportError::Prompt(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CommunityReportError::Prompt(e.to_string()))
}

/// Builds the entity and relation CSV blocks for one community. Fails if an entity is not
/// in the graph.
pub fn build_prompt_tables(entities: &[String], graph: &KnowledgeGraph) -> Result<PromptTables, CommunityReportError> {
    let mut entity_rows = Vec::with_capacity(entities.len());
    for entity in entities {
        let node = graph
            .node(entity)
            .ok_or_else(|| CommunityReportError::UnknownEntity(entity.clone()))?;
        entity_rows.push(vec![entity.clone(), node.description.clone()]);
    }
    let entity_table = write_table(&["id", "entity", "description"], entity_rows)?;

    let pairs = collect_relation_pairs(entities, graph);
    let relation_count = pairs.len();
    let relation_table = write_table(
        &["id", "source", "target", "description"],
        pairs
            .into_iter()
            .map(|pair| vec![pair.source, pair.target, pair.description]),
    )?;

    Ok(PromptTables {
        entity_table,
        relation_table,
        relation_count,
    })
}
