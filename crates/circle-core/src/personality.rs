//! Personality scoring: a fixed weight table over the six quiz statements.

use circle_types::models::{PersonalityType, QuizAnswers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    VeryUnlikeMe,
    UnlikeMe,
    Neutral,
    LikeMe,
    VeryLikeMe,
}

impl Answer {
    pub const ALL: [Answer; 5] = [
        Answer::VeryUnlikeMe,
        Answer::UnlikeMe,
        Answer::Neutral,
        Answer::LikeMe,
        Answer::VeryLikeMe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryUnlikeMe => "Very unlike me",
            Self::UnlikeMe => "Unlike me",
            Self::Neutral => "Neutral",
            Self::LikeMe => "Like me",
            Self::VeryLikeMe => "Very like me",
        }
    }

    pub fn parse(text: &str) -> Option<Answer> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(text))
    }
}

pub struct Question {
    pub id: &'static str,
    pub statement: &'static str,
    likes: PersonalityType,
    unlikes: PersonalityType,
}

impl Question {
    /// Weight this answer adds, and to which type.
    fn weigh(&self, answer: Answer) -> Option<(PersonalityType, u32)> {
        match answer {
            Answer::VeryLikeMe => Some((self.likes, 2)),
            Answer::LikeMe => Some((self.likes, 1)),
            Answer::Neutral => None,
            Answer::UnlikeMe => Some((self.unlikes, 1)),
            Answer::VeryUnlikeMe => Some((self.unlikes, 2)),
        }
    }
}

pub static QUESTIONS: [Question; 6] = [
    Question {
        id: "question1",
        statement: "I feel energised after meeting new people.",
        likes: PersonalityType::Connector,
        unlikes: PersonalityType::Thinker,
    },
    Question {
        id: "question2",
        statement: "Friends come to me when they need someone to listen.",
        likes: PersonalityType::Supporter,
        unlikes: PersonalityType::Explorer,
    },
    Question {
        id: "question3",
        statement: "I would rather try something new than stick with what I know.",
        likes: PersonalityType::Explorer,
        unlikes: PersonalityType::Supporter,
    },
    Question {
        id: "question4",
        statement: "I like to think things through before I speak.",
        likes: PersonalityType::Thinker,
        unlikes: PersonalityType::Connector,
    },
    Question {
        id: "question5",
        statement: "I often make things just for the joy of making them.",
        likes: PersonalityType::Creator,
        unlikes: PersonalityType::Thinker,
    },
    Question {
        id: "question6",
        statement: "I notice how the people around me are feeling.",
        likes: PersonalityType::Supporter,
        unlikes: PersonalityType::Creator,
    },
];

pub fn question(id: &str) -> Option<&'static Question> {
    QUESTIONS.iter().find(|q| q.id == id)
}

pub fn description(kind: PersonalityType) -> &'static str {
    match kind {
        PersonalityType::Connector => {
            "You bring people together. Conversations start around you and newcomers feel welcome."
        }
        PersonalityType::Supporter => {
            "You are the steady one. People trust you to listen and to show up when it matters."
        }
        PersonalityType::Explorer => {
            "You chase the new. Fresh places, ideas and plans keep you moving."
        }
        PersonalityType::Thinker => {
            "You look beneath the surface. Your questions make everyone think a little harder."
        }
        PersonalityType::Creator => {
            "You make things. Your ideas turn into something others can see and share."
        }
    }
}

/// Accumulated weight per type, indexed in `PersonalityType::ALL` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scores([u32; 5]);

impl Scores {
    pub fn get(&self, kind: PersonalityType) -> u32 {
        self.0[kind.index()]
    }

    /// Highest score. Ties go to the type listed first.
    pub fn winner(&self) -> PersonalityType {
        let mut best = PersonalityType::ALL[0];
        for kind in PersonalityType::ALL {
            if self.get(kind) > self.get(best) {
                best = kind;
            }
        }
        best
    }
}

/// Unknown question ids and answer texts contribute nothing.
pub fn score(answers: &QuizAnswers) -> Scores {
    let mut scores = Scores::default();
    for (id, text) in answers {
        let (Some(q), Some(answer)) = (question(id), Answer::parse(text)) else {
            continue;
        };
        if let Some((kind, weight)) = q.weigh(answer) {
            scores.0[kind.index()] += weight;
        }
    }
    scores
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub personality_type: PersonalityType,
    pub description: &'static str,
    pub scores: Scores,
}

pub fn classify(answers: &QuizAnswers) -> Classification {
    let scores = score(answers);
    let personality_type = scores.winner();
    Classification {
        personality_type,
        description: description(personality_type),
        scores,
    }
}
