//! Mapping from the external book-metadata lookup to catalog candidates.
//!
//! The lookup itself is a collaborator (`BookLookup`); this module only
//! shapes its summaries into entries the catalog can accept.

use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Catalog label for books whose lookup result carries no category.
pub const GENRE_UNDEFINED: &str = "Gênero não definido";
pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_AUTHOR: &str = "Unknown author";

/// Lookup categories mapped onto the catalog's pt-BR genre labels.
static GENRE_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Fiction", "Ficção"),
        ("Science", "Ciência"),
        ("History", "História"),
        ("Biography", "Biografia"),
        ("Autobiography", "Autobiografia"),
        ("Art", "Arte"),
        ("Philosophy", "Filosofia"),
        ("Computers", "Computação"),
        ("Technology", "Tecnologia"),
        ("Education", "Educação"),
        ("Poetry", "Poesia"),
        ("Drama", "Drama"),
        ("Religion", "Religião"),
        ("Business", "Negócios"),
        ("Comics & Graphic Novels", "Quadrinhos e Graphic Novels"),
        ("Juvenile Fiction", "Ficção Juvenil"),
        ("Juvenile Nonfiction", "Não Ficção Juvenil"),
        ("Self-Help", "Autoajuda"),
        ("Psychology", "Psicologia"),
        ("Health & Fitness", "Saúde e Boa Forma"),
        ("Medical", "Medicina"),
        ("Cooking", "Culinária"),
        ("Travel", "Viagem"),
        ("Sports & Recreation", "Esportes e Recreação"),
        ("Nature", "Natureza"),
        ("Animals", "Animais"),
        ("Social Science", "Ciências Sociais"),
        ("Political Science", "Ciência Política"),
        ("Law", "Direito"),
        ("Music", "Música"),
        ("Photography", "Fotografia"),
        ("Architecture", "Arquitetura"),
        ("Design", "Design"),
        ("Performing Arts", "Artes Cênicas"),
        ("Foreign Language Study", "Estudo de Línguas Estrangeiras"),
        ("Language Arts & Disciplines", "Linguística e Comunicação"),
        ("Mathematics", "Matemática"),
        ("Science Fiction", "Ficção Científica"),
        ("Fantasy", "Fantasia"),
        ("Horror", "Terror"),
        ("Mystery", "Mistério"),
        ("Thriller", "Suspense"),
        ("Romance", "Romance"),
        ("Adventure", "Aventura"),
        ("Humor", "Humor"),
        ("True Crime", "Crime Real"),
        ("Family & Relationships", "Família e Relacionamentos"),
        ("Gardening", "Jardinagem"),
        ("Crafts & Hobbies", "Artesanato e Passatempos"),
        ("House & Home", "Casa e Lar"),
        ("Transportation", "Transporte"),
        ("Reference", "Referência"),
        ("Study Aids", "Guias de Estudo"),
        ("Body, Mind & Spirit", "Corpo, Mente e Espírito"),
        ("Antiques & Collectibles", "Antiguidades e Colecionáveis"),
        ("Literary Criticism", "Crítica Literária"),
        ("Games & Activities", "Jogos e Atividades"),
        ("Foreign Language", "Idioma Estrangeiro"),
        ("Political", "Político"),
        ("Cultural", "Cultural"),
        ("Erotica", "Erótico"),
        ("War", "Guerra"),
        ("Western", "Faroeste"),
        ("Mythology", "Mitologia"),
        ("Folklore", "Folclore"),
        ("Essays", "Ensaios"),
        ("Satire", "Sátira"),
        ("Short Stories", "Contos"),
        ("Epic", "Épico"),
        ("Memoir", "Memórias"),
    ])
});

/// One hit returned by the metadata lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSummary {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub primary_category: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Catalog entry proposed from a lookup hit, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookCandidate {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub cover: String,
    pub copies: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError(pub String);

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "book lookup failed: {}", self.0)
    }
}

impl Error for LookupError {}

/// External free-text book metadata search.
pub trait BookLookup {
    fn search(&self, query: &str) -> Result<Vec<BookSummary>, LookupError>;
}

/// Maps a lookup category to its catalog genre label.
///
/// Unknown categories pass through unchanged; a missing or blank category
/// becomes [`GENRE_UNDEFINED`].
pub fn genre_label(category: Option<&str>) -> String {
    match category.map(str::trim).filter(|value| !value.is_empty()) {
        None => GENRE_UNDEFINED.to_string(),
        Some(category) => GENRE_LABELS
            .get(category)
            .map_or_else(|| category.to_string(), |label| (*label).to_string()),
    }
}

impl From<BookSummary> for BookCandidate {
    fn from(summary: BookSummary) -> Self {
        let title = summary
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let author = if summary.authors.is_empty() {
            UNKNOWN_AUTHOR.to_string()
        } else {
            summary.authors.join(", ")
        };
        Self {
            title,
            author,
            genre: genre_label(summary.primary_category.as_deref()),
            cover: summary.thumbnail_url.unwrap_or_default(),
            copies: 1,
        }
    }
}

/// Runs `query` against `lookup` and shapes every hit into a candidate.
///
/// A blank query returns no candidates without calling the lookup.
pub fn lookup_candidates(
    lookup: &dyn BookLookup,
    query: &str,
) -> Result<Vec<BookCandidate>, LookupError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let hits = lookup.search(query)?;
    debug!(
        "event=book_lookup module=lookup status=ok hits={}",
        hits.len()
    );
    Ok(hits.into_iter().map(BookCandidate::from).collect())
}

#[cfg(test)]
mod tests {
    use super::{
        genre_label, lookup_candidates, BookLookup, BookSummary, LookupError, GENRE_UNDEFINED,
        UNKNOWN_AUTHOR, UNTITLED,
    };
    use std::cell::Cell;

    struct CountingLookup {
        calls: Cell<usize>,
        hits: Vec<BookSummary>,
    }

    impl BookLookup for CountingLookup {
        fn search(&self, _query: &str) -> Result<Vec<BookSummary>, LookupError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.hits.clone())
        }
    }

    #[test]
    fn genre_label_translates_passes_through_and_defaults() {
        assert_eq!(genre_label(Some("Science Fiction")), "Ficção Científica");
        assert_eq!(genre_label(Some("Cyberpunk")), "Cyberpunk");
        assert_eq!(genre_label(None), GENRE_UNDEFINED);
        assert_eq!(genre_label(Some("  ")), GENRE_UNDEFINED);
    }

    #[test]
    fn blank_query_skips_lookup() {
        let lookup = CountingLookup {
            calls: Cell::new(0),
            hits: vec![BookSummary::default()],
        };
        assert!(lookup_candidates(&lookup, "   ").unwrap().is_empty());
        assert_eq!(lookup.calls.get(), 0);
    }

    #[test]
    fn hits_are_mapped_with_fallbacks() {
        let lookup = CountingLookup {
            calls: Cell::new(0),
            hits: vec![
                BookSummary {
                    title: Some("Neuromancer".to_string()),
                    authors: vec!["William Gibson".to_string(), "Someone Else".to_string()],
                    primary_category: Some("Fiction".to_string()),
                    thumbnail_url: Some("http://covers/neuro.jpg".to_string()),
                },
                BookSummary::default(),
            ],
        };

        let candidates = lookup_candidates(&lookup, "gibson").unwrap();
        assert_eq!(lookup.calls.get(), 1);
        assert_eq!(candidates[0].author, "William Gibson, Someone Else");
        assert_eq!(candidates[0].genre, "Ficção");
        assert_eq!(candidates[0].copies, 1);
        assert_eq!(candidates[1].title, UNTITLED);
        assert_eq!(candidates[1].author, UNKNOWN_AUTHOR);
        assert_eq!(candidates[1].genre, GENRE_UNDEFINED);
        assert_eq!(candidates[1].cover, "");
    }
}
