//! Built-in answer templates.

use crate::types::PromptTemplate;

/// Identifier of the default grounded-answer template.
pub const DEFAULT_TEMPLATE_ID: &str = "rag.answer";

const ANSWER_EN: &str = r#"Answer the question using only the documentation excerpts below.
Cite excerpts by their number, e.g. [1].
{{#if history}}

Conversation so far:
{{#each history}}
{{role}}: {{content}}
{{/each}}
{{/if}}

Documentation:
{{#each passages}}
[{{index}}] {{source}}{{#if section}} ({{section}}){{/if}}
{{text}}

{{/each}}
Question: {{question}}
Answer:"#;

const ANSWER_PT: &str = r#"Responda a pergunta usando apenas os trechos da documentação abaixo.
Cite os trechos pelo número, por exemplo [1].
{{#if history}}

Conversa até agora:
{{#each history}}
{{role}}: {{content}}
{{/each}}
{{/if}}

Documentação:
{{#each passages}}
[{{index}}] {{source}}{{#if section}} ({{section}}){{/if}}
{{text}}

{{/each}}
Pergunta: {{question}}
Resposta:"#;

/// Look up a built-in template by id and language.
pub fn builtin_template(id: &str, language: &str) -> Option<PromptTemplate> {
    if id != DEFAULT_TEMPLATE_ID {
        return None;
    }

    let (system, template, not_found) = match language {
        "en" => (
            "You are a documentation assistant. If the excerpts do not contain the answer, say so.",
            ANSWER_EN,
            "I could not find information about that in the documentation.",
        ),
        "pt" => (
            "Você é um assistente de documentação. Se os trechos não contiverem a resposta, diga isso.",
            ANSWER_PT,
            "Não encontrei informações sobre isso na documentação.",
        ),
        _ => return None,
    };

    Some(PromptTemplate {
        id: DEFAULT_TEMPLATE_ID.to_string(),
        language: language.to_string(),
        title: "Grounded answer".to_string(),
        system: Some(system.to_string()),
        template: template.to_string(),
        not_found_message: not_found.to_string(),
        revision: 1,
    })
}

/// Languages with a built-in answer template.
pub fn builtin_languages() -> &'static [&'static str] {
    &["en", "pt"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_languages_resolve() {
        for lang in builtin_languages() {
            let template = builtin_template(DEFAULT_TEMPLATE_ID, lang).unwrap();
            assert_eq!(template.language, *lang);
            assert!(!template.not_found_message.is_empty());
        }
    }

    #[test]
    fn test_not_found_messages_differ_per_language() {
        let en = builtin_template(DEFAULT_TEMPLATE_ID, "en").unwrap();
        let pt = builtin_template(DEFAULT_TEMPLATE_ID, "pt").unwrap();
        assert_ne!(en.not_found_message, pt.not_found_message);
        assert_ne!(en.identity(), pt.identity());
    }

    #[test]
    fn test_unknown_lookup() {
        assert!(builtin_template(DEFAULT_TEMPLATE_ID, "fr").is_none());
        assert!(builtin_template("agent.ask", "en").is_none());
    }
}
