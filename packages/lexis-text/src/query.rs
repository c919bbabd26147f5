use std::{collections::BTreeSet, fmt};

use crate::{Error, Language, LexemeVector, Result, Weight, WeightedPosition, normalize};
use lexis_config::{MAX_POSITION, Ranking};

/// Score contributed by one position of each weight class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankWeights {
	pub a: f32,
	pub b: f32,
	pub c: f32,
	pub d: f32,
}
impl RankWeights {
	pub fn of(&self, weight: Weight) -> f32 {
		match weight {
			Weight::A => self.a,
			Weight::B => self.b,
			Weight::C => self.c,
			Weight::D => self.d,
		}
	}
}
impl Default for RankWeights {
	fn default() -> Self {
		Self::from(&Ranking::default())
	}
}
impl From<&Ranking> for RankWeights {
	fn from(cfg: &Ranking) -> Self {
		Self { a: cfg.weight_a, b: cfg.weight_b, c: cfg.weight_c, d: cfg.weight_d }
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryTerm {
	pub lexeme: String,
	/// Matches every lexeme that starts with `lexeme`.
	pub prefix: bool,
	/// Weight classes the term may match. Empty accepts all.
	pub weights: Vec<Weight>,
}
impl QueryTerm {
	fn positions(&self, vector: &LexemeVector) -> Vec<WeightedPosition> {
		let accepts = |position: &&WeightedPosition| {
			self.weights.is_empty() || self.weights.contains(&position.weight)
		};

		if self.prefix {
			vector
				.with_prefix(&self.lexeme)
				.flat_map(|(_, positions)| positions.iter().filter(accepts).copied())
				.collect()
		} else {
			vector
				.get(&self.lexeme)
				.map(|positions| positions.iter().filter(accepts).copied().collect())
				.unwrap_or_default()
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryNode {
	Term(QueryTerm),
	Not(Box<QueryNode>),
	And(Box<QueryNode>, Box<QueryNode>),
	Or(Box<QueryNode>, Box<QueryNode>),
	/// `right` must occur exactly `distance` positions after `left`.
	Phrase { left: Box<QueryNode>, right: Box<QueryNode>, distance: u16 },
}
impl QueryNode {
	fn precedence(&self) -> u8 {
		match self {
			Self::Or(..) => 1,
			Self::And(..) => 2,
			Self::Phrase { .. } => 3,
			Self::Term(_) | Self::Not(_) => 4,
		}
	}

	fn contains_negation(&self) -> bool {
		match self {
			Self::Term(_) => false,
			Self::Not(_) => true,
			Self::And(left, right) | Self::Or(left, right) =>
				left.contains_negation() || right.contains_negation(),
			Self::Phrase { left, right, .. } =>
				left.contains_negation() || right.contains_negation(),
		}
	}

	fn eval(&self, vector: &LexemeVector) -> bool {
		match self {
			Self::Term(term) => !term.positions(vector).is_empty(),
			Self::Not(inner) => !inner.eval(vector),
			Self::And(left, right) => left.eval(vector) && right.eval(vector),
			Self::Or(left, right) => left.eval(vector) || right.eval(vector),
			Self::Phrase { .. } => !self.phrase_positions(vector).is_empty(),
		}
	}

	/// Positions at which this operand ends, as seen from an enclosing phrase.
	fn phrase_positions(&self, vector: &LexemeVector) -> BTreeSet<u16> {
		match self {
			Self::Term(term) => term.positions(vector).into_iter().map(|p| p.position).collect(),
			Self::Not(_) => BTreeSet::new(),
			Self::Or(left, right) => {
				let mut out = left.phrase_positions(vector);

				out.extend(right.phrase_positions(vector));

				out
			},
			Self::And(left, right) => {
				let left = left.phrase_positions(vector);
				let right = right.phrase_positions(vector);

				if left.is_empty() || right.is_empty() {
					return BTreeSet::new();
				}

				left.union(&right).copied().collect()
			},
			Self::Phrase { left, right, distance } => {
				let left = left.phrase_positions(vector);

				right
					.phrase_positions(vector)
					.into_iter()
					.filter(|end| {
						end.checked_sub(*distance).is_some_and(|start| left.contains(&start))
					})
					.collect()
			},
		}
	}

	fn collect_terms<'a>(&'a self, out: &mut Vec<&'a QueryTerm>) {
		match self {
			Self::Term(term) =>
				if !out.contains(&term) {
					out.push(term);
				},
			Self::Not(_) => {},
			Self::And(left, right) | Self::Or(left, right) => {
				left.collect_terms(out);
				right.collect_terms(out);
			},
			Self::Phrase { left, right, .. } => {
				left.collect_terms(out);
				right.collect_terms(out);
			},
		}
	}

	fn fmt_child(&self, f: &mut fmt::Formatter<'_>, child: &Self, right: bool) -> fmt::Result {
		let wrap = if right {
			child.precedence() <= self.precedence() && child.precedence() < 4
		} else {
			child.precedence() < self.precedence()
		};

		if wrap { write!(f, "( {child} )") } else { write!(f, "{child}") }
	}
}
impl fmt::Display for QueryNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Term(term) => {
				f.write_str("'")?;

				for ch in term.lexeme.chars() {
					match ch {
						'\'' => f.write_str("''")?,
						'\\' => f.write_str("\\\\")?,
						_ => write!(f, "{ch}")?,
					}
				}

				f.write_str("'")?;

				if term.prefix || !term.weights.is_empty() {
					f.write_str(":")?;

					if term.prefix {
						f.write_str("*")?;
					}

					for weight in &term.weights {
						write!(f, "{weight}")?;
					}
				}

				Ok(())
			},
			Self::Not(inner) => {
				f.write_str("!")?;

				self.fmt_child(f, inner, false)
			},
			Self::And(left, right) => {
				self.fmt_child(f, left, false)?;
				f.write_str(" & ")?;
				self.fmt_child(f, right, true)
			},
			Self::Or(left, right) => {
				self.fmt_child(f, left, false)?;
				f.write_str(" | ")?;
				self.fmt_child(f, right, true)
			},
			Self::Phrase { left, right, distance } => {
				self.fmt_child(f, left, false)?;

				if *distance == 1 {
					f.write_str(" <-> ")?;
				} else {
					write!(f, " <{distance}> ")?;
				}

				self.fmt_child(f, right, true)
			},
		}
	}
}

/// A boolean lexeme query, normalized with the same language pipeline as the vectors it
/// is matched against.
///
/// Operands that reduce to stopwords vanish. A query with no remaining operand matches
/// nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextQuery {
	root: Option<QueryNode>,
	language: Language,
}
impl TextQuery {
	/// Parses `&`, `|`, `!`, parentheses, `<->` and `<N>` phrases, and `:*` / `:AB`
	/// operand flags. Phrase operators bind tighter than `&`, which binds tighter than `|`.
	pub fn parse(expr: &str, language: Language) -> Result<Self> {
		let tokens = Lexer { chars: expr.chars().collect(), idx: 0 }.tokens()?;
		let mut parser = Parser { tokens, idx: 0, language };
		let root = parser.or()?;

		if let Some(token) = parser.tokens.get(parser.idx) {
			return Err(Error::QuerySyntax { message: format!("unexpected {token:?}") });
		}

		Ok(Self { root, language })
	}

	/// Every lexeme of `text` must be present.
	pub fn plain(text: &str, language: Language) -> Self {
		let root = lexemes(text, language)
			.into_iter()
			.map(|(lexeme, _)| {
				QueryNode::Term(QueryTerm { lexeme, prefix: false, weights: Vec::new() })
			})
			.reduce(|left, right| QueryNode::And(Box::new(left), Box::new(right)));

		Self { root, language }
	}

	pub fn is_empty(&self) -> bool {
		self.root.is_none()
	}

	pub fn language(&self) -> Language {
		self.language
	}

	pub fn root(&self) -> Option<&QueryNode> {
		self.root.as_ref()
	}

	/// Distinct non-negated terms, in query order.
	pub fn terms(&self) -> Vec<&QueryTerm> {
		let mut out = Vec::new();

		if let Some(root) = self.root.as_ref() {
			root.collect_terms(&mut out);
		}

		out
	}

	pub fn matches(&self, vector: &LexemeVector) -> bool {
		self.root.as_ref().is_some_and(|root| root.eval(vector))
	}

	/// Mean over query terms of `1 - Π(1 - w)`, where the product runs over the positions
	/// a term hits. Zero when the query does not match.
	pub fn rank(&self, vector: &LexemeVector, weights: &RankWeights) -> f32 {
		if !self.matches(vector) {
			return 0.0;
		}

		let terms = self.terms();

		if terms.is_empty() {
			return 0.0;
		}

		let total: f32 = terms
			.iter()
			.map(|term| {
				let miss: f32 = term
					.positions(vector)
					.iter()
					.map(|position| 1.0 - weights.of(position.weight).clamp(0.0, 1.0))
					.product();

				1.0 - miss
			})
			.sum();

		total / terms.len() as f32
	}
}
impl fmt::Display for TextQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.root.as_ref() {
			Some(root) => write!(f, "{root}"),
			None => Ok(()),
		}
	}
}

fn lexemes(text: &str, language: Language) -> Vec<(String, u16)> {
	normalize(text, language)
		.tokens()
		.iter()
		.filter_map(|token| language.lexeme(&token.text).map(|lexeme| (lexeme, token.position)))
		.collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
	Operand { text: String, prefix: bool, weights: Vec<Weight> },
	And,
	Or,
	Not,
	Open,
	Close,
	Follow(u16),
}

struct Lexer {
	chars: Vec<char>,
	idx: usize,
}
impl Lexer {
	fn tokens(mut self) -> Result<Vec<Token>> {
		let mut out = Vec::new();

		while let Some(ch) = self.peek() {
			let token = match ch {
				_ if ch.is_whitespace() => {
					self.idx += 1;

					continue;
				},
				'&' => self.single(Token::And),
				'|' => self.single(Token::Or),
				'!' => self.single(Token::Not),
				'(' => self.single(Token::Open),
				')' => self.single(Token::Close),
				'<' => self.follow()?,
				_ => self.operand()?,
			};

			out.push(token);
		}

		Ok(out)
	}

	fn single(&mut self, token: Token) -> Token {
		self.idx += 1;

		token
	}

	fn follow(&mut self) -> Result<Token> {
		let start = self.idx;

		self.idx += 1;

		let mut inner = String::new();

		loop {
			match self.next() {
				Some('>') => break,
				Some(ch) => inner.push(ch),
				None => return Err(self.error("unterminated phrase operator", start)),
			}
		}

		let distance = match inner.trim() {
			"-" => 1,
			digits => digits
				.parse::<u32>()
				.map_err(|_| self.error("invalid phrase distance", start))?
				.min(u32::from(MAX_POSITION)) as u16,
		};

		Ok(Token::Follow(distance))
	}

	fn operand(&mut self) -> Result<Token> {
		let start = self.idx;
		let mut text = String::new();

		if self.peek() == Some('\'') {
			self.idx += 1;

			loop {
				match self.next() {
					Some('\'') =>
						if self.peek() == Some('\'') {
							self.idx += 1;
							text.push('\'');
						} else {
							break;
						},
					Some('\\') => match self.next() {
						Some(escaped) => text.push(escaped),
						None => return Err(self.error("dangling escape", start)),
					},
					Some(ch) => text.push(ch),
					None => return Err(self.error("unterminated quoted operand", start)),
				}
			}
		} else {
			while let Some(ch) = self.peek() {
				if ch.is_whitespace() || matches!(ch, '&' | '|' | '!' | '(' | ')' | '<' | ':') {
					break;
				}

				text.push(ch);

				self.idx += 1;
			}
		}

		if text.is_empty() {
			return Err(self.error("empty operand", start));
		}

		let mut prefix = false;
		let mut weights = Vec::new();

		if self.peek() == Some(':') {
			self.idx += 1;

			let flags_start = self.idx;

			while let Some(ch) = self.peek() {
				if ch == '*' {
					prefix = true;
				} else if let Some(weight) = Weight::from_letter(ch) {
					if !weights.contains(&weight) {
						weights.push(weight);
					}
				} else {
					break;
				}

				self.idx += 1;
			}

			if self.idx == flags_start {
				return Err(self.error("expected `*` or a weight letter after `:`", flags_start));
			}

			weights.sort_unstable_by(|left, right| right.cmp(left));
		}

		Ok(Token::Operand { text, prefix, weights })
	}

	fn peek(&self) -> Option<char> {
		self.chars.get(self.idx).copied()
	}

	fn next(&mut self) -> Option<char> {
		let ch = self.peek()?;

		self.idx += 1;

		Some(ch)
	}

	fn error(&self, what: &str, offset: usize) -> Error {
		Error::QuerySyntax { message: format!("{what} at offset {offset}") }
	}
}

struct Parser {
	tokens: Vec<Token>,
	idx: usize,
	language: Language,
}
impl Parser {
	fn or(&mut self) -> Result<Option<QueryNode>> {
		let mut node = self.and()?;

		while self.eat(&Token::Or) {
			let right = self.and()?;

			node = combine(node, right, QueryNode::Or);
		}

		Ok(node)
	}

	fn and(&mut self) -> Result<Option<QueryNode>> {
		let mut node = self.phrase()?;

		while self.eat(&Token::And) {
			let right = self.phrase()?;

			node = combine(node, right, QueryNode::And);
		}

		Ok(node)
	}

	fn phrase(&mut self) -> Result<Option<QueryNode>> {
		let mut node = self.unary()?;

		while let Some(Token::Follow(distance)) = self.tokens.get(self.idx).cloned() {
			self.idx += 1;

			let right = self.unary()?;

			let operands = [node.as_ref(), right.as_ref()];

			if operands.into_iter().flatten().any(QueryNode::contains_negation) {
				return Err(Error::QuerySyntax {
					message: "negation is not supported inside a phrase".to_string(),
				});
			}

			node = combine(node, right, |left, right| QueryNode::Phrase { left, right, distance });
		}

		Ok(node)
	}

	fn unary(&mut self) -> Result<Option<QueryNode>> {
		match self.tokens.get(self.idx).cloned() {
			Some(Token::Not) => {
				self.idx += 1;

				Ok(self.unary()?.map(|inner| QueryNode::Not(Box::new(inner))))
			},
			Some(Token::Open) => {
				self.idx += 1;

				let inner = self.or()?;

				if !self.eat(&Token::Close) {
					return Err(Error::QuerySyntax {
						message: "missing closing parenthesis".to_string(),
					});
				}

				Ok(inner)
			},
			Some(Token::Operand { text, prefix, weights }) => {
				self.idx += 1;

				Ok(self.operand(&text, prefix, &weights))
			},
			Some(other) => Err(Error::QuerySyntax {
				message: format!("expected an operand, found {other:?}"),
			}),
			None => Err(Error::QuerySyntax { message: "expected an operand".to_string() }),
		}
	}

	/// Multi-word operands become a phrase spaced by the words' own positions.
	fn operand(&self, text: &str, prefix: bool, weights: &[Weight]) -> Option<QueryNode> {
		let mut node: Option<(QueryNode, u16)> = None;

		for (lexeme, position) in lexemes(text, self.language) {
			let term = QueryNode::Term(QueryTerm { lexeme, prefix, weights: weights.to_vec() });

			node = Some(match node {
				None => (term, position),
				Some((left, previous)) => (
					QueryNode::Phrase {
						left: Box::new(left),
						right: Box::new(term),
						distance: position.saturating_sub(previous).max(1),
					},
					position,
				),
			});
		}

		node.map(|(node, _)| node)
	}

	fn eat(&mut self, token: &Token) -> bool {
		if self.tokens.get(self.idx) == Some(token) {
			self.idx += 1;

			return true;
		}

		false
	}
}

fn combine(
	left: Option<QueryNode>,
	right: Option<QueryNode>,
	join: impl FnOnce(Box<QueryNode>, Box<QueryNode>) -> QueryNode,
) -> Option<QueryNode> {
	match (left, right) {
		(Some(left), Some(right)) => Some(join(Box::new(left), Box::new(right))),
		(Some(node), None) | (None, Some(node)) => Some(node),
		(None, None) => None,
	}
}
