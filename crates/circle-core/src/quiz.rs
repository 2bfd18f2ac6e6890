use tracing::{info, warn};

use circle_backend::records;
use circle_types::Query;
use circle_types::api::QuizPatch;
use circle_types::models::{PersonalityType, QuizAnswers, User};

use crate::context::AppContext;
use crate::error::{CoreError, Result};
use crate::personality::{self, Answer, QUESTIONS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalityResult {
    pub personality_type: PersonalityType,
    pub description: String,
    /// True when the result came from the client's own scoring after the
    /// backend scorer did not answer in time.
    pub computed_locally: bool,
}

/// Every question answered with one of the five answer texts, and nothing else.
pub fn validate(answers: &QuizAnswers) -> Result<()> {
    for (question, answer) in answers {
        if personality::question(question).is_none() || Answer::parse(answer).is_none() {
            return Err(CoreError::InvalidAnswer {
                question: question.clone(),
                answer: answer.clone(),
            });
        }
    }
    match QUESTIONS.iter().find(|q| !answers.contains_key(q.id)) {
        Some(missing) => Err(CoreError::UnansweredQuestion(missing.id.to_string())),
        None => Ok(()),
    }
}

/// Store the answers and clear any previous result so the backend scorer
/// fills it in afresh.
pub async fn submit_answers(ctx: &AppContext, answers: &QuizAnswers) -> Result<User> {
    validate(answers)?;
    let id = ctx.user_id()?;
    let patch = QuizPatch {
        quiz_answers: answers,
        personality_type: None,
        personality_description: None,
    };
    let user = records::patch::<User, _>(ctx.backend(), &Query::new().eq("id", id.to_string()), &patch)
        .await?
        .pop()
        .ok_or(CoreError::UnknownUser(id))?;
    ctx.set_user(Some(user.clone()));
    info!("{} submitted quiz answers", id);
    Ok(user)
}

/// Wait for the backend to score the quiz. After the configured number of
/// polls the client scores the stored answers itself, once, and saves that.
pub async fn await_personality(ctx: &AppContext) -> Result<PersonalityResult> {
    let settings = ctx.settings();
    let mut last = None;

    for attempt in 0..settings.poll_attempts {
        if attempt > 0 {
            tokio::time::sleep(settings.poll_interval).await;
        }
        match ctx.refresh_user().await {
            Ok(user) => {
                if let Some(kind) = user.personality_type {
                    let description = user
                        .personality_description
                        .clone()
                        .unwrap_or_else(|| personality::description(kind).to_string());
                    return Ok(PersonalityResult {
                        personality_type: kind,
                        description,
                        computed_locally: false,
                    });
                }
                last = Some(user);
            }
            Err(e) => warn!("Polling for personality failed (attempt {}): {}", attempt + 1, e),
        }
    }

    let user = match last {
        Some(user) => user,
        None => ctx.refresh_user().await?,
    };
    let answers = user.quiz_answers.clone().unwrap_or_default();
    let result = personality::classify(&answers);
    warn!(
        "No personality from the backend after {} polls, scored {} locally",
        settings.poll_attempts, user.id
    );

    let patch = QuizPatch {
        quiz_answers: &answers,
        personality_type: Some(result.personality_type),
        personality_description: Some(result.description),
    };
    let query = Query::new().eq("id", user.id.to_string());
    if let Some(updated) = records::patch::<User, _>(ctx.backend(), &query, &patch).await?.pop() {
        ctx.set_user(Some(updated));
    }

    Ok(PersonalityResult {
        personality_type: result.personality_type,
        description: result.description.to_string(),
        computed_locally: true,
    })
}

pub async fn complete_quiz(ctx: &AppContext, answers: &QuizAnswers) -> Result<PersonalityResult> {
    submit_answers(ctx, answers).await?;
    await_personality(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sheet(answer: &str) -> QuizAnswers {
        QUESTIONS
            .iter()
            .map(|q| (q.id.to_string(), answer.to_string()))
            .collect()
    }

    #[test]
    fn accepts_a_complete_sheet() {
        assert!(validate(&full_sheet("Like me")).is_ok());
    }

    #[test]
    fn rejects_unknown_answers_and_questions() {
        let mut answers = full_sheet("Neutral");
        answers.insert("question2".into(), "Maybe".into());
        assert!(matches!(
            validate(&answers),
            Err(CoreError::InvalidAnswer { question, .. }) if question == "question2"
        ));

        let mut answers = full_sheet("Neutral");
        answers.insert("question7".into(), "Neutral".into());
        assert!(matches!(validate(&answers), Err(CoreError::InvalidAnswer { .. })));
    }

    #[test]
    fn rejects_missing_answers() {
        let mut answers = full_sheet("Neutral");
        answers.remove("question6");
        assert!(matches!(
            validate(&answers),
            Err(CoreError::UnansweredQuestion(q)) if q == "question6"
        ));
    }
}
