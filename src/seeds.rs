//! Built-in problem rows and the default task progression.
//!
//! The study runs even with no TOML config: these rows cover the three
//! default tasks (Easy/Medium/Hard). A config `[[problems]]` bank can add
//! or override rows by index.

use std::collections::HashMap;

use crate::domain::{ProblemCard, TaskSpec};

/// Default task progression, in presentation order.
pub fn default_task_list() -> Vec<TaskSpec> {
  vec![
    TaskSpec { label: "Problem 1: Easy".into(), row: 5 },
    TaskSpec { label: "Problem 2: Medium".into(), row: 35 },
    TaskSpec { label: "Problem 3: Hard".into(), row: 3 },
  ]
}

/// Built-in problem rows, keyed by dataset row index.
pub fn seed_problems() -> HashMap<usize, ProblemCard> {
  let mut rows = HashMap::new();

  rows.insert(5, ProblemCard {
    problem_statement: "How many different 3-character codes can be formed from the \
      characters A, B, C, D if characters may repeat? Explain your reasoning, don't \
      just give a number."
      .into(),
    problem_solution: "Each of the 3 positions can hold any of the 4 characters \
      independently, so by the multiplication principle there are 4 * 4 * 4 = 4^3 = 64 codes."
      .into(),
    new_problem: "How many different 2-character codes can be formed from the characters \
      A, B, C, D, E if characters may repeat? Justify your answer."
      .into(),
    new_solution: "Each of the 2 positions can hold any of the 5 characters, so there are \
      5 * 5 = 5^2 = 25 codes."
      .into(),
  });

  rows.insert(35, ProblemCard {
    problem_statement: "A student club has 10 members. In how many ways can a committee \
      of 4 members be chosen? Order does not matter. Show the steps of your reasoning."
      .into(),
    problem_solution: "Choosing 4 of 10 without order is a combination: C(10,4) = 10! / (4! * 6!) \
      = (10 * 9 * 8 * 7) / (4 * 3 * 2 * 1) = 210 committees."
      .into(),
    new_problem: "A class has 8 students. In how many ways can a team of 3 students be \
      chosen, if order does not matter? Justify your answer."
      .into(),
    new_solution: "C(8,3) = 8! / (3! * 5!) = (8 * 7 * 6) / (3 * 2 * 1) = 56 teams.".into(),
  });

  rows.insert(3, ProblemCard {
    problem_statement: "How many distinct arrangements are there of the letters of the word \
      BANANA? Explain how you deal with repeated letters."
      .into(),
    problem_solution: "BANANA has 6 letters with A repeated 3 times and N repeated 2 times. \
      Dividing out the indistinguishable orderings: 6! / (3! * 2!) = 720 / 12 = 60 arrangements."
      .into(),
    new_problem: "How many distinct arrangements are there of the letters of the word COFFEE? \
      Justify your answer."
      .into(),
    new_solution: "COFFEE has 6 letters with F repeated twice and E repeated twice: \
      6! / (2! * 2!) = 720 / 4 = 180 arrangements."
      .into(),
  });

  rows
}
