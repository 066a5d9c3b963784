use crate::models::ScoredResult;

pub fn folder_structure_prompt(user_prompt: &str) -> String {
    format!(
        "Based on the following request, generate a clean folder and file structure.
List each folder and file path clearly, one per line, using forward slashes (/) to separate folders and files.
Do NOT include comments, descriptions, or explanations in the paths.
Do NOT use code blocks or markdown formatting.
Just list the paths directly, like:

backend/app/app.py
backend/requirements.txt
frontend/src/index.js
frontend/package.json

User request: {}

Generate ONLY the file and folder paths, nothing else:
",
        user_prompt.trim()
    )
}

pub fn answer_prompt(question: &str, passages: &[ScoredResult]) -> String {
    let mut context = String::new();
    for (index, passage) in passages.iter().enumerate() {
        context.push_str(&format!(
            "[{}] (collection: {}, score: {:.3})\n{}\n\n",
            index + 1,
            passage.collection,
            passage.score,
            passage.text.trim()
        ));
    }

    format!(
        "Answer the question using only the context passages below.
If the context does not contain the answer, say that you don't know.
Cite passages by their number in square brackets.

Context:
{context}Question: {}

Answer:
",
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_prompt_embeds_request() {
        let prompt = folder_structure_prompt("  A Flask API with auth ");
        assert!(prompt.contains("User request: A Flask API with auth\n"));
        assert!(prompt.ends_with("nothing else:\n"));
    }

    #[test]
    fn answer_prompt_numbers_passages() {
        let passages = vec![
            ScoredResult {
                score: 0.91,
                text: "Redis persists with RDB snapshots.".to_string(),
                collection: "redis".to_string(),
            },
            ScoredResult {
                score: 0.72,
                text: "AOF logs every write.".to_string(),
                collection: "redis".to_string(),
            },
        ];

        let prompt = answer_prompt("How does Redis persist data?", &passages);
        assert!(prompt.contains("[1] (collection: redis, score: 0.910)\nRedis persists"));
        assert!(prompt.contains("[2] (collection: redis, score: 0.720)\nAOF"));
        assert!(prompt.contains("Question: How does Redis persist data?"));
    }
}
