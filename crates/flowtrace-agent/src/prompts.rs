use flowtrace_core::{FlowPair, ReplyVocabulary};

/// The fixed system instruction. The reply formats it describes come from
/// the same vocabulary the reply classifier uses.
pub fn system_prompt(vocabulary: &ReplyVocabulary) -> String {
    let lookup = format!(
        "{{\n  \"{}\": \"{}\",\n  \"{}\": \"<function name>\",\n  \"reason\": \"<why its implementation is needed>\"\n}}",
        vocabulary.action_key, vocabulary.fetch_action, vocabulary.func_name_key
    );

    let stop = match &vocabulary.stop_action {
        Some(stop) => format!(
            "When the end point is reached, or the value provably cannot reach it, reply:\n\
             ```json\n{{\n  \"{}\": \"{}\"\n}}\n```\n\n",
            vocabulary.action_key, stop
        ),
        None => String::new(),
    };

    format!(
        "[1. Task]\n\
         You are tracing how a value moves through an application's source code. \
         Given a start point and an end point, follow the value statement by statement \
         from the start to the end, recording each statement it passes through and the \
         function calls that carry it.\n\n\
         [2. Input]\n\
         Every message has three sections:\n\
         - [Question]: the value to follow and the start and end points, as (file, line, code)\n\
         - [Analyzed steps]: the JSON array of steps recorded so far\n\
         - [Known function implementations]: line-numbered source of functions retrieved so far\n\n\
         [3. Output]\n\
         Reply with exactly one JSON object per message.\n\n\
         When you need to read a function's implementation, reply:\n\
         ```json\n{}\n```\n\n\
         To record the next step of the flow, reply:\n\
         ```json\n{{\n  \"file\": \"<file path>\",\n  \"line\": <line number>,\n  \
         \"code\": \"<source of that line>\",\n  \"desc\": \"<how the value moves here>\"\n}}\n```\n\n\
         {}\
         [4. Rules]\n\
         - When [Analyzed steps] is empty, the first step is the start point itself\n\
         - Do not skip statements; every step must depend on the previous one by data or control\n\
         - Copy file paths and code exactly as they appear in the known implementations\n\
         - When the step you record is the end point, use the end point's file, line and code\n\
         - Reply with JSON only, no other text",
        lookup, stop
    )
}

/// Natural-language question for one flow.
pub fn question(pair: &FlowPair) -> String {
    format!(
        "Trace how `{}` flows from the start point to the end point. Start: {}. End: {}.",
        pair.target_var, pair.start, pair.end
    )
}

/// The per-round user message, rebuilt from memory every round.
pub fn user_message(question: &str, steps: &str, impls: &str) -> String {
    format!(
        "[Question]\n{}\n[Analyzed steps]\n{}\n[Known function implementations]\n{}\n",
        question, steps, impls
    )
}
