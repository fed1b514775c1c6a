//! Prompt templates for query generation and answer composition.

use crate::llm::{OutputSchema, Prompt};
use crate::schema::SchemaInfo;

/// Returned instead of an answer when there was nothing to summarise.
pub const NO_ANSWER_MESSAGE: &str =
    "I could not produce an answer because no query result was available.";

const QUERY_SYSTEM_TEMPLATE: &str = r#"Given an input question, create a syntactically correct {dialect} query to run to help find the answer.
Unless the user specifies in their question a specific number of examples they wish to obtain, always limit your query to at most {top_k} results.
You can order the results by a relevant column to return the most interesting examples in the database.

Never query for all the columns from a specific table, only ask for the few relevant columns given the question.

Pay attention to use only the column names that you can see in the schema description.
Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.
Wrap each column name in double quotes if it contains spaces or is a reserved word.
If the question involves "today", use the date function of {dialect}.

Only use the following tables:
{table_info}

Return a single SQL statement in the "query" field and nothing else."#;

/// Structured output requested from the query writer.
pub fn query_output_schema() -> OutputSchema {
    OutputSchema::strings(
        "QueryOutput",
        "Generated SQL query.",
        &[("query", "Syntactically valid SQL query.")],
    )
}

/// System instructions parameterised by dialect, row limit and schema text.
pub fn query_system_prompt(schema: &SchemaInfo) -> String {
    QUERY_SYSTEM_TEMPLATE
        .replace("{dialect}", &schema.dialect)
        .replace("{top_k}", &schema.top_k.to_string())
        .replace("{table_info}", &schema.table_info)
}

pub fn query_prompt(question: &str, schema: &SchemaInfo) -> Prompt {
    Prompt::new(
        Some(query_system_prompt(schema)),
        format!("Question: {}", question),
    )
}

/// Answer prompt for a query that ran (successfully or not).
///
/// `failed` switches the wording so the model explains the failure instead of
/// inventing data from an error message.
pub fn answer_prompt(question: &str, query: Option<&str>, result: &str, failed: bool) -> Prompt {
    let query_text = query.unwrap_or("(no query was generated)");
    let user = if failed {
        format!(
            "The following SQL query failed while answering a user question.\n\
             Question: {question}\n\
             SQL Query: {query_text}\n\
             SQL Error: {result}\n\n\
             Tell the user concisely that the data could not be retrieved and why, \
             based only on the error. Do not make up any figures."
        )
    } else {
        format!(
            "Given the following user question, corresponding SQL query, \
             and SQL result, answer the user question.\n\n\
             Question: {question}\n\
             SQL Query: {query_text}\n\
             SQL Result: {result}\n\n\
             Answer concisely, using only values present in the SQL result."
        )
    };
    Prompt::user(user)
}
