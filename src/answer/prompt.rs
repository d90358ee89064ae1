//! 프롬프트 구성

use serde::Serialize;

use super::context::ContextBlock;

/// 답변 규칙 (출처 구분, 정보 부족 인정, 간결성, 인용)
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on provided context from PDF documents and web sources.

Instructions:
1. Use the provided context to answer the question accurately
2. If information comes from PDFs, mention \"According to the PDF documents...\"
3. If information comes from web sources, mention \"According to web sources...\"
4. If you use both sources, clearly distinguish between them
5. If the context doesn't contain enough information, say so and provide what you can
6. Be concise but comprehensive
7. Always cite your sources when possible
8. Format your response clearly with proper sections if needed";

/// system + user 프롬프트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// 질문 + 컨텍스트 블록 → 프롬프트
///
/// 블록이 비어 있으면 컨텍스트 구간과 출처 표기 없이,
/// 일반 지식에 기반한 답변임을 밝히도록 지시합니다.
pub fn build_prompt(question: &str, block: &ContextBlock) -> Prompt {
    let question = question.trim();

    let user = if block.is_empty() {
        format!(
            "Question: {}\n\n\
             No relevant context was found in the documents or on the web. \
             Please provide a helpful answer using your general knowledge, \
             and mention that the answer is based on general knowledge.",
            question
        )
    } else {
        format!(
            "Context Information:\n{}\n\n\
             Question: {}\n\n\
             Please provide a comprehensive answer based on the available context.",
            block.render(),
            question
        )
    };

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::ContextAssembler;
    use crate::knowledge::SearchHit;

    #[test]
    fn test_empty_context_prompt() {
        let prompt = build_prompt("  What is Rust?  ", &ContextBlock::default());

        assert!(prompt.user.starts_with("Question: What is Rust?\n\n"));
        assert!(prompt.user.contains("general knowledge"));
        assert!(!prompt.user.contains("Context Information"));
        assert!(!prompt.user.contains("PDF Source"));
        assert!(!prompt.user.contains("Web Source"));
        assert!(!prompt.user.contains("==="));
        assert_eq!(prompt.system, SYSTEM_PROMPT);
    }

    #[test]
    fn test_context_prompt() {
        let hits = vec![SearchHit {
            text: "Water boils at 100 degrees Celsius.".to_string(),
            score: 0.7,
            source_doc_id: "physics.pdf".to_string(),
            ordinal: 0,
        }];
        let block = ContextAssembler::default().assemble(&hits, &[]);
        let prompt = build_prompt("At what temperature does water boil?", &block);

        assert!(prompt
            .user
            .starts_with("Context Information:\n=== INFORMATION FROM PDF DOCUMENTS ==="));
        assert!(prompt.user.contains(
            "PDF Source 1: Water boils at 100 degrees Celsius.\n\n\
             Question: At what temperature does water boil?"
        ));
        assert!(prompt.user.ends_with("based on the available context."));
    }

    #[test]
    fn test_system_prompt_rules() {
        assert!(SYSTEM_PROMPT.contains("According to the PDF documents..."));
        assert!(SYSTEM_PROMPT.contains("According to web sources..."));
        assert!(SYSTEM_PROMPT.contains("doesn't contain enough information"));
    }
}
