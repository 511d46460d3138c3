//! Prompt templates for the planner's model calls

use skillweave_types::{SkillCatalog, SkillRecord};

/// Skills listed in the analysis overview
pub const OVERVIEW_LIMIT: usize = 20;
const OVERVIEW_DESCRIPTION_CHARS: usize = 200;
const SKILL_CONTENT_CHARS: usize = 3000;

/// First `max` characters of `s`
pub(crate) fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `- [id] name: description` for the first [`OVERVIEW_LIMIT`] skills
pub fn skills_overview(catalog: &SkillCatalog) -> String {
    catalog
        .values()
        .take(OVERVIEW_LIMIT)
        .map(|s| {
            format!(
                "- [{}] {}: {}",
                s.id,
                s.name,
                clip(&s.description, OVERVIEW_DESCRIPTION_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every skill with its full description
pub fn all_skills_context(catalog: &SkillCatalog) -> String {
    catalog
        .values()
        .map(|s| format!("- [{}] {}\n  {}", s.id, s.name, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collected skills, with the head of SKILL.md when it has been loaded
pub fn format_skills<'a>(skills: impl IntoIterator<Item = &'a SkillRecord>) -> String {
    skills
        .into_iter()
        .map(|s| {
            let mut entry = format!("- [{}] {}\n  {}", s.id, s.name, s.description);
            if let Some(content) = s.content.as_deref().filter(|c| !c.is_empty()) {
                entry.push_str("\n  Main Content: ");
                entry.push_str(clip(content, SKILL_CONTENT_CHARS));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `- [id] name: description`, one line per candidate
pub fn candidate_list<'a>(skills: impl IntoIterator<Item = &'a SkillRecord>) -> String {
    skills
        .into_iter()
        .map(|s| format!("- [{}] {}: {}", s.id, s.name, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Candidates with their SKILL.md heads for the deep filter pass
pub fn candidate_details<'a>(skills: impl IntoIterator<Item = &'a SkillRecord>) -> String {
    skills
        .into_iter()
        .map(|s| {
            let content = s.content.as_deref().unwrap_or("(not loaded)");
            format!(
                "### [{}] {}\nDescription: {}\nContent:\n{}",
                s.id,
                s.name,
                s.description,
                clip(content, SKILL_CONTENT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Relevance pass over names and descriptions
pub fn filter_skills_fast(query: &str, candidates: &str) -> String {
    format!(
        r#"You are filtering retrieved skills by relevance to a user query.

User Query: {query}

Candidate Skills:
{candidates}

Keep only the skills that directly contribute to the query. Drop skills that merely share keywords with it.

Respond with JSON only:
{{
    "filtered_skill_ids": ["skill_a", "skill_b"],
    "reasoning": "brief explanation"
}}

Return an empty list when none of the candidates is relevant."#
    )
}

/// Executability pass over SKILL.md bodies
pub fn filter_skills_deep(query: &str, candidates: &str) -> String {
    format!(
        r#"You are checking whether each candidate skill can actually carry out its part of a user query.

User Query: {query}

Candidate Skills (with instructions):
{candidates}

For each skill, read its instructions and decide whether it can execute the part of the query it would be responsible for. Drop skills that cannot, and skills made redundant by a better candidate.

Respond with JSON only:
{{
    "filtered_skill_ids": ["skill_a"],
    "skill_analysis": {{
        "skill_a": {{"can_execute": true, "reason": "brief reason"}},
        "skill_b": {{"can_execute": false, "reason": "brief reason"}}
    }},
    "reasoning": "brief explanation"
}}"#
    )
}

/// First search-mode call: chat or skills, plus sub-queries
pub fn analyze_query(query: &str, overview: &str) -> String {
    format!(
        r#"You are a skill analyzer. Given a user query, decide whether it needs specific skills or can be answered by chatting.

User Query: {query}

Available Skills Overview:
{overview}

Determine:
1. Whether the query requires skills/capabilities to fulfill
2. If so, which capabilities are directly required
3. Which prerequisites or dependencies might be required

Respond with JSON only:
{{
    "needs_skills": true,
    "intent_summary": "brief description of the user's intent",
    "skill_queries": ["search query 1", "search query 2"],
    "chat_response": null,
    "reasoning": "brief explanation"
}}

- Set "needs_skills" to false for casual chat, greetings, or questions you can answer directly, and put the answer in "chat_response".
- When skills are needed, "skill_queries" holds short search queries, one per capability."#
    )
}

/// Reflection call over the skills collected so far
pub fn evaluate_completeness(query: &str, intent: &str, collected: &str) -> String {
    format!(
        r#"You are evaluating whether the retrieved skills are sufficient to complete a user task.

User Query: {query}
Intent Summary: {intent}

Retrieved Skills:
{collected}

Evaluate:
1. Can these skills together fulfill the request?
2. Are any capabilities or dependencies missing?
3. Is there a gap that needs additional skills?

Respond with JSON only:
{{
    "is_complete": true,
    "missing_capabilities": [],
    "additional_queries": [],
    "clarification_needed": null
}}

Use "additional_queries" for searches that could find the missing skills, and "clarification_needed" only for a question the user must answer before you can proceed."#
    )
}

/// Dependency graph over the filtered candidates
pub fn build_dag(query: &str, selected: &str) -> String {
    format!(
        r#"You are building a dependency graph (DAG) for executing skills.

User Query: {query}

Selected Skills:
{selected}

Build the graph so that:
- Each skill is a node identified by its skill id
- "dag" maps every skill id to the list of skill ids it depends on (skills that must finish first)
- "execution_order" respects those dependencies; a nested list marks skills that can run in parallel

Respond with JSON only:
{{
    "dag": {{"skill_a": [], "skill_b": ["skill_a"]}},
    "execution_order": ["skill_a", ["skill_b", "skill_c"]],
    "filtered_skill_ids": ["skill_a", "skill_b", "skill_c"],
    "reasoning": "brief explanation"
}}

Choose the smallest set of skills that fully satisfies the query, and keep only the best of any skills that overlap."#
    )
}

/// Single-call selection over the whole catalog
pub fn direct_select(query: &str, all_skills: &str) -> String {
    format!(
        r#"You are a skill selector. Given a user query and all available skills, select the relevant skills and build an execution DAG.

User Query: {query}

All Available Skills:
{all_skills}

Tasks:
1. Decide whether the query needs skills or is casual chat
2. If skills are needed, select every relevant skill from the list above
3. Build a dependency graph over the selected skills: "dag" maps each skill id to the ids it depends on

Respond with JSON only:
{{
    "needs_skills": true,
    "chat_response": null,
    "selected_skill_ids": ["skill_a", "skill_b"],
    "dag": {{"skill_a": [], "skill_b": ["skill_a"]}},
    "execution_order": ["skill_a", "skill_b"],
    "reasoning": "brief explanation"
}}

Only use skill ids that appear in the list. A nested list in "execution_order" marks skills that can run in parallel."#
    )
}
