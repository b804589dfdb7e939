//! Built-in questions, always available as the last stage

use super::{quality, QuestionRequest, RawQuestion};
use crate::types::Question;
use rand::seq::SliceRandom;

/// (question, options, correct index, category)
const POOL: &[(&str, [&str; 4], i64, &str)] = &[
    (
        "What is the smallest country in the world?",
        ["Monaco", "Vatican City", "San Marino", "Liechtenstein"],
        1,
        "Geography",
    ),
    (
        "What is the capital of Iceland?",
        ["Oslo", "Reykjavik", "Helsinki", "Stockholm"],
        1,
        "Geography",
    ),
    (
        "Which is the longest river in Europe?",
        ["Danube", "Rhine", "Volga", "Seine"],
        2,
        "Geography",
    ),
    (
        "How many time zones does Russia span?",
        ["7", "9", "11", "13"],
        2,
        "Geography",
    ),
    (
        "Which country has the most islands?",
        ["Indonesia", "Sweden", "Canada", "Japan"],
        1,
        "Geography",
    ),
    (
        "What is the largest desert on Earth, including polar deserts?",
        ["Sahara", "Gobi", "Antarctic", "Arabian"],
        2,
        "Geography",
    ),
    (
        "Which mountain range separates Europe from Asia?",
        ["Alps", "Urals", "Carpathians", "Caucasus"],
        1,
        "Geography",
    ),
    (
        "What is the capital of Australia?",
        ["Sydney", "Melbourne", "Canberra", "Perth"],
        2,
        "Geography",
    ),
    (
        "In which year was the United Nations founded?",
        ["1943", "1945", "1947", "1949"],
        1,
        "History",
    ),
    (
        "Who was the first human in space?",
        [
            "Neil Armstrong",
            "Buzz Aldrin",
            "Yuri Gagarin",
            "Alan Shepard",
        ],
        2,
        "History",
    ),
    (
        "How long did the Hundred Years' War actually last?",
        ["100 years", "116 years", "99 years", "124 years"],
        1,
        "History",
    ),
    (
        "Which was the first country to grant women the vote nationally?",
        ["USA", "New Zealand", "Switzerland", "England"],
        1,
        "History",
    ),
    (
        "In which year did the First World War end?",
        ["1916", "1917", "1918", "1919"],
        2,
        "History",
    ),
    (
        "Which empire built Machu Picchu?",
        ["Aztec", "Maya", "Inca", "Olmec"],
        2,
        "History",
    ),
    (
        "Who was the first emperor of Rome?",
        ["Julius Caesar", "Augustus", "Nero", "Caligula"],
        1,
        "History",
    ),
    (
        "In which year did the Berlin Wall fall?",
        ["1987", "1988", "1989", "1990"],
        2,
        "History",
    ),
    (
        "How many bones does an adult human body have?",
        ["186", "206", "226", "246"],
        1,
        "Science",
    ),
    (
        "What is the most common blood type?",
        ["A+", "B+", "O+", "AB+"],
        2,
        "Science",
    ),
    (
        "Which is the lightest chemical element?",
        ["Helium", "Hydrogen", "Lithium", "Beryllium"],
        1,
        "Science",
    ),
    (
        "Roughly what share of the Earth's surface is covered by water?",
        ["61%", "71%", "81%", "91%"],
        1,
        "Science",
    ),
    (
        "What is the speed of sound in dry air at 20 degrees Celsius?",
        ["343 m/s", "443 m/s", "543 m/s", "643 m/s"],
        0,
        "Science",
    ),
    (
        "Which planet has the most known moons?",
        ["Jupiter", "Saturn", "Uranus", "Neptune"],
        1,
        "Science",
    ),
    (
        "What gas do plants absorb from the atmosphere for photosynthesis?",
        ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"],
        2,
        "Science",
    ),
    (
        "What is the chemical symbol for gold?",
        ["Go", "Gd", "Au", "Ag"],
        2,
        "Science",
    ),
    (
        "Who composed the opera 'The Magic Flute'?",
        ["Beethoven", "Bach", "Mozart", "Handel"],
        2,
        "Art & Culture",
    ),
    (
        "How many Harry Potter films were released?",
        ["6", "7", "8", "9"],
        2,
        "Art & Culture",
    ),
    (
        "In which year was Netflix founded?",
        ["1995", "1997", "1999", "2001"],
        1,
        "Art & Culture",
    ),
    (
        "Who painted 'The Starry Night'?",
        ["Monet", "Van Gogh", "Picasso", "Dali"],
        1,
        "Art & Culture",
    ),
    (
        "How many strings does a classical guitar have?",
        ["4", "5", "6", "7"],
        2,
        "Art & Culture",
    ),
    (
        "Who wrote the novel '1984'?",
        [
            "Aldous Huxley",
            "George Orwell",
            "Ray Bradbury",
            "H. G. Wells",
        ],
        1,
        "Art & Culture",
    ),
    (
        "How many players are on the court for one volleyball team?",
        ["4", "5", "6", "7"],
        2,
        "Sports",
    ),
    (
        "In which country did the ancient Olympic Games originate?",
        ["Italy", "Greece", "France", "England"],
        1,
        "Sports",
    ),
    (
        "How long is a marathon?",
        ["40.195 km", "41.195 km", "42.195 km", "43.195 km"],
        2,
        "Sports",
    ),
    (
        "How many points is a touchdown worth in American football?",
        ["5", "6", "7", "8"],
        1,
        "Sports",
    ),
    (
        "Which country has won the most FIFA World Cup titles?",
        ["Germany", "Italy", "Argentina", "Brazil"],
        3,
        "Sports",
    ),
    (
        "How many rings are on the Olympic flag?",
        ["4", "5", "6", "7"],
        1,
        "Sports",
    ),
    (
        "How many teeth does an adult human normally have?",
        ["28", "30", "32", "34"],
        2,
        "General Knowledge",
    ),
    (
        "Which language has the most native speakers?",
        ["English", "Mandarin", "Spanish", "Hindi"],
        1,
        "General Knowledge",
    ),
    (
        "How many hearts does an octopus have?",
        ["1", "2", "3", "4"],
        2,
        "General Knowledge",
    ),
    (
        "Which of these animals sleeps the least per day?",
        ["Giraffe", "Elephant", "Dolphin", "Horse"],
        0,
        "General Knowledge",
    ),
    (
        "What does 'www' stand for in a website address?",
        [
            "World Wide Web",
            "World Web Wide",
            "Web World Wide",
            "Wide World Web",
        ],
        0,
        "General Knowledge",
    ),
];

#[derive(Debug, Clone)]
pub struct StaticPool {
    questions: Vec<Question>,
}

impl Default for StaticPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticPool {
    pub fn new() -> Self {
        let raw = POOL
            .iter()
            .enumerate()
            .map(|(i, (question, options, correct, category))| RawQuestion {
                id: Some(format!("static-{:03}", i + 1)),
                question: question.to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
                correct_index: Some(*correct),
                category: Some(category.to_string()),
                difficulty: None,
            })
            .collect();

        Self {
            questions: quality::gate(raw, "static"),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Shuffled questions matching the request, not yet excluded
    pub fn candidates(&self, request: &QuestionRequest) -> Vec<Question> {
        let mut matching: Vec<Question> = self
            .questions
            .iter()
            .filter(|q| !request.exclude.contains(&q.id))
            .filter(|q| quality::matches_request(q, request))
            .cloned()
            .collect();
        matching.shuffle(&mut rand::rng());
        matching
    }
}
