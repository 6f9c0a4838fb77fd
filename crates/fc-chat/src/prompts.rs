//! Prompt builders for the oracle protocol

use fc_core::ExecutionContext;
use fc_memory::{AttemptRecord, Interaction, RetrievalContext};

const REPAIR_FORMAT: &str = "\
ERROR ANALYSIS:
<explain what caused the error>

PROPOSED FIXES:
<list the specific changes being made>

CODE:
```python
<corrected code>
```

EXPLANATION:
<explain how the fixes address the error>";

/// Main prompt for a fresh query
pub fn query_prompt(
    context: &ExecutionContext,
    retrieval: &RetrievalContext,
    history_window: usize,
    query: &str,
) -> String {
    let last_analysis = retrieval
        .last_analysis
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "None".to_string());

    let mut prompt = String::from("You are a forecasting assistant. Current context:\n");
    prompt.push_str(&format!("Data available: {}\n", context.summary()));
    prompt.push_str("Data structure:\n");
    prompt.push_str(&format!("- CSV file: {}\n", display_path(context)));
    prompt.push_str(&format!("- Target column: {}\n", or_none(&context.target_column)));
    prompt.push_str(&format!("- Series ID column: {}\n", or_none(&context.series_id_column)));
    prompt.push_str(&format!("Previous analysis: {}\n", last_analysis));
    prompt.push_str(&history_section(&retrieval.conversation_history, history_window));
    prompt.push_str(&format!("\nUser query: {}\n", query));
    prompt.push_str(
        "
If you need to generate code, respond with:
ACTION: CODE_GENERATION
CODE:
```python
<your code here>
```
EXPLANATION: <explain what the code does>

For other actions, respond with:
ACTION: <DATA_ANALYSIS|FORECAST|GENERAL>
EXPLANATION: <why this action>
TOOLS_NEEDED: <list of required tools>
",
    );
    prompt
}

/// Repair prompt after a failed run, carrying every earlier attempt of the turn
pub fn repair_prompt(
    error_text: &str,
    code: &str,
    context: &ExecutionContext,
    attempts: &[AttemptRecord],
) -> String {
    let mut prompt = String::from("The code execution failed. Here's the context:\n\n");
    prompt.push_str(&format!("Error Message:\n{}\n\n", error_text.trim_end()));
    prompt.push_str(&format!("Failed Code:\n```python\n{}\n```\n\n", code));
    prompt.push_str(&data_context(context));
    prompt.push_str("\nPrevious Attempts Summary:\n");
    for attempt in attempts {
        prompt.push_str(&format!(
            "\nAttempt {} (last stage: {}):\n```python\n{}\n```\nError:\n{}\n",
            attempt.attempt_number,
            attempt.diagnostics.execution_step,
            attempt.code,
            attempt.error_text.trim_end()
        ));
    }
    prompt.push_str(
        "
Please:
1. Analyze the error message and explain what's wrong
2. Provide a detailed explanation of the fixes needed
3. Provide the corrected code
4. Avoid repeating fixes that already failed in earlier attempts

Respond in this format:

",
    );
    prompt.push_str(REPAIR_FORMAT);
    prompt.push('\n');
    prompt
}

/// Prompt for an operator-directed `fix <instructions>` turn
pub fn fix_prompt(
    last_code: &str,
    last_result: &str,
    instructions: &str,
    context: &ExecutionContext,
) -> String {
    let mut prompt = String::from("Previous execution resulted in:\n\n");
    prompt.push_str(&format!("Code:\n```python\n{}\n```\n\n", last_code));
    prompt.push_str(&format!("Results:\n{}\n\n", last_result.trim()));
    prompt.push_str(&format!("User wants to: {}\n\n", instructions));
    prompt.push_str(&data_context(context));
    prompt.push_str(&format!(
        "
Please provide fixed code that:
1. Keeps the core functionality
2. {}
3. Handles all edge cases

Respond in this format:

",
        instructions
    ));
    prompt.push_str(REPAIR_FORMAT);
    prompt.push('\n');
    prompt
}

fn history_section(history: &[Interaction], window: usize) -> String {
    if history.is_empty() || window == 0 {
        return String::new();
    }
    let mut text = String::from("\nPrevious interactions:\n");
    let skip = history.len().saturating_sub(window);
    for interaction in &history[skip..] {
        text.push_str(&format!("\nUser: {}\n", interaction.query));
        text.push_str(&format!("Assistant: {}\n", interaction.response));
        if let Some(error) = &interaction.error {
            text.push_str(&format!("Error: {}\n", error));
        }
        if let Some(fixes) = interaction.fixes.as_ref().filter(|f| !f.is_empty()) {
            let attempts: Vec<String> = fixes
                .iter()
                .map(|f| format!("attempt {}", f.attempt_number))
                .collect();
            text.push_str(&format!("Fixes: {}\n", attempts.join(", ")));
        }
    }
    text
}

fn data_context(context: &ExecutionContext) -> String {
    let Some(frame) = context.frame() else {
        return "Data Context:\n- No dataset loaded\n".to_string();
    };
    let date_format = frame
        .column("date")
        .map(|c| c.dtype().to_string())
        .unwrap_or_else(|| "n/a".to_string());

    let mut text = String::from("Data Context:\n");
    text.push_str(&format!("- DataFrame 'df' contains {} rows\n", frame.len()));
    text.push_str(&format!("- Columns: {}\n", frame.column_names().join(", ")));
    text.push_str(&format!("- Target column: '{}'\n", or_none(&context.target_column)));
    text.push_str(&format!("- Series ID column: '{}'\n", or_none(&context.series_id_column)));
    text.push_str(&format!("- Date column format: {}\n", date_format));
    text
}

fn display_path(context: &ExecutionContext) -> String {
    context
        .csv_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "None".to_string())
}

fn or_none(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("None")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::{Cell, Column, DataFrame, Diagnostics, ExecutionStep};

    fn context() -> ExecutionContext {
        let frame = DataFrame::new(vec![
            Column::new("date", vec![Cell::Text("2024-01-01".into())]),
            Column::new("value", vec![Cell::Int(3)]),
            Column::new("series", vec![Cell::Text("a".into())]),
        ])
        .unwrap();
        ExecutionContext::with_frame(frame, "value", "series")
    }

    fn attempt(n: u32, error: &str) -> AttemptRecord {
        AttemptRecord {
            attempt_number: n,
            code: format!("result = attempt_{}", n),
            error_text: error.to_string(),
            diagnostics: Diagnostics {
                execution_step: ExecutionStep::Executing,
                ..Diagnostics::default()
            },
            error_context: None,
        }
    }

    #[test]
    fn test_query_prompt_includes_context_and_window() {
        let history: Vec<Interaction> = (0..7)
            .map(|i| Interaction::new(format!("query {}", i), format!("response {}", i)))
            .collect();
        let retrieval = RetrievalContext {
            last_analysis: Some(serde_json::json!({"total_series": 3})),
            conversation_history: history,
        };

        let prompt = query_prompt(&context(), &retrieval, 5, "sum the values");

        assert!(prompt.contains("Data available: CSV with 1 rows, columns: date, value, series"));
        assert!(prompt.contains("- Target column: value"));
        assert!(prompt.contains("Previous analysis: {\"total_series\":3}"));
        assert!(!prompt.contains("User: query 1\n"));
        assert!(prompt.contains("User: query 2\n"));
        assert!(prompt.contains("User: query 6\n"));
        assert!(prompt.contains("User query: sum the values"));
        assert!(prompt.contains("ACTION: CODE_GENERATION"));
    }

    #[test]
    fn test_query_prompt_without_dataset() {
        let prompt = query_prompt(&ExecutionContext::new(), &RetrievalContext::default(), 5, "hi");
        assert!(prompt.contains("Data available: No data loaded"));
        assert!(prompt.contains("- CSV file: None"));
        assert!(prompt.contains("Previous analysis: None"));
        assert!(!prompt.contains("Previous interactions"));
    }

    #[test]
    fn test_repair_prompt_is_cumulative() {
        let attempts = vec![attempt(1, "KeyError: 'valu'"), attempt(2, "TypeError: bad operand")];

        let prompt = repair_prompt("TypeError: bad operand", "result = attempt_2", &context(), &attempts);

        assert!(prompt.contains("Error Message:\nTypeError: bad operand"));
        assert!(prompt.contains("Attempt 1 (last stage: executing)"));
        assert!(prompt.contains("KeyError: 'valu'"));
        assert!(prompt.contains("Attempt 2 (last stage: executing)"));
        assert!(prompt.contains("- DataFrame 'df' contains 1 rows"));
        assert!(prompt.contains("- Date column format: object"));
        assert!(prompt.contains("ERROR ANALYSIS:"));
    }

    #[test]
    fn test_fix_prompt_carries_instructions() {
        let prompt = fix_prompt("result = 1", "Returned Variables: result", "write results to csv", &context());
        assert!(prompt.contains("```python\nresult = 1\n```"));
        assert!(prompt.contains("User wants to: write results to csv"));
        assert!(prompt.contains("2. write results to csv"));
        assert!(prompt.contains("PROPOSED FIXES:"));
    }
}
