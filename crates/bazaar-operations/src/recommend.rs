//! Package recommendations.
//!
//! Every mode scores candidates from the registry index and attaches [`Reason`] tags that
//! explain the score. Rankings sort by descending score, ties by ascending package id.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    fmt,
};

use bazaar_config::config::RecommendSettings;
use bazaar_core::BazaarResult;
use bazaar_registry::{Index, InstalledPackage, Package, PackageType, RegistryError};
use tracing::debug;

use crate::Service;

const SECONDS_PER_DAY: f64 = 86_400.0;

const TOOL_MATCH_BONUS: f64 = 0.2;
const SAME_AUTHOR_BONUS: f64 = 0.15;
const VERIFIED_BONUS: f64 = 0.1;

const POPULAR_THRESHOLD: f64 = 0.7;
const RECENT_THRESHOLD: f64 = 0.7;
const SIMILARITY_THRESHOLD: f64 = 0.3;
const HIGHLY_RATED_STARS: u64 = 5;

const FEATURED_MIN_STARS: u64 = 10;
const FEATURED_MIN_POPULARITY: f64 = 0.5;
const FEATURED_BOOST: f64 = 1.5;

/// Why a package was recommended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reason {
    Popular,
    Recent,
    SimilarInterests,
    HighlyRated,
    /// A keyword matches one of the user's active tools.
    MatchesTool(String),
    SameAuthor,
    Verified,
    SameType,
    SimilarKeywords,
    Complementary,
    Featured,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Popular => write!(f, "popular"),
            Reason::Recent => write!(f, "recently updated"),
            Reason::SimilarInterests => write!(f, "matches your interests"),
            Reason::HighlyRated => write!(f, "highly rated"),
            Reason::MatchesTool(tool) => write!(f, "works with {tool}"),
            Reason::SameAuthor => write!(f, "by an author you already use"),
            Reason::Verified => write!(f, "verified"),
            Reason::SameType => write!(f, "same type"),
            Reason::SimilarKeywords => write!(f, "similar keywords"),
            Reason::Complementary => write!(f, "complements it"),
            Reason::Featured => write!(f, "featured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub package: Package,
    pub score: f64,
    pub reasons: Vec<Reason>,
}

impl Recommendation {
    fn new(package: &Package, score: f64) -> Self {
        Self {
            package: package.clone(),
            score,
            reasons: Vec::new(),
        }
    }

    fn add_reason(&mut self, reason: Reason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }
}

/// What is known about the user asking for recommendations.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    /// Ids of installed packages.
    pub installed: Vec<String>,
    /// When non-empty, only these types are recommended.
    pub preferred_types: Vec<PackageType>,
    /// Identifiers of the tools the user works with, e.g. `"nvim"`.
    pub active_tools: Vec<String>,
    /// Interests, on top of the keywords of installed packages.
    pub keywords: Vec<String>,
}

impl UserContext {
    pub fn from_installed(installed: &[InstalledPackage]) -> Self {
        Self {
            installed: installed.iter().map(|p| p.id().to_string()).collect(),
            ..Default::default()
        }
    }
}

/// `0.6·min(1, downloads/1000) + 0.4·min(1, stars/50)`.
pub fn popularity_score(package: &Package) -> f64 {
    let downloads = (package.downloads as f64 / 1000.0).min(1.0);
    let stars = (package.stars as f64 / 50.0).min(1.0);
    0.6 * downloads + 0.4 * stars
}

/// Decays from 1.0 to 0.1 as the gap between the package's last update and its newest
/// release grows from 30 to 365 days.
pub fn recency_score(package: &Package) -> f64 {
    let Some(latest) = package.latest_version() else {
        return 0.0;
    };

    let elapsed = package.updated_at - latest.released_at;
    let days = (elapsed.num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    if days <= 30.0 {
        1.0
    } else if days >= 365.0 {
        0.1
    } else {
        1.0 - (days - 30.0) / 335.0 * 0.9
    }
}

/// Jaccard similarity between a package's keywords and the user's keyword counts.
///
/// `user` must be keyed by lower-cased keywords; counts only matter for membership.
pub fn keyword_similarity(keywords: &[String], user: &HashMap<String, usize>) -> f64 {
    if keywords.is_empty() || user.is_empty() {
        return 0.0;
    }

    let unique: HashSet<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let shared = unique.iter().filter(|k| user.contains_key(*k)).count();
    let union = user.len() + unique.len() - shared;
    shared as f64 / union as f64
}

/// Packages of different types sharing at least one keyword.
pub fn are_complementary(package: &Package, source: &Package) -> bool {
    package.package_type != source.package_type
        && package.keywords.iter().any(|k| source.has_keyword(k))
}

fn keyword_counts<'a, I: IntoIterator<Item = &'a String>>(keywords: I) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for keyword in keywords {
        *counts.entry(keyword.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

fn rank(mut recommendations: Vec<Recommendation>, limit: usize) -> Vec<Recommendation> {
    recommendations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.package.id.cmp(&b.package.id))
    });
    recommendations.truncate(limit);
    recommendations
}

/// Ranks index packages for a user.
#[derive(Debug, Clone)]
pub struct Recommender<'a> {
    service: &'a Service,
    settings: RecommendSettings,
}

impl<'a> Recommender<'a> {
    pub fn new(service: &'a Service) -> Self {
        Self {
            service,
            settings: RecommendSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RecommendSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RecommendSettings {
        &self.settings
    }

    fn candidates(index: &Index) -> impl Iterator<Item = &Package> {
        index.packages().iter().filter(|p| p.is_valid())
    }

    /// Personalised recommendations from popularity, recency and keyword overlap with the
    /// user's interests and installed packages.
    pub fn recommend_for_user(&self, ctx: &UserContext) -> BazaarResult<Vec<Recommendation>> {
        let index = self.service.get_index()?;

        let installed: HashSet<&str> = ctx.installed.iter().map(String::as_str).collect();
        let installed_packages: Vec<&Package> = installed
            .iter()
            .filter_map(|id| index.get(id))
            .collect();

        let user_keywords = keyword_counts(
            ctx.keywords
                .iter()
                .chain(installed_packages.iter().flat_map(|p| p.keywords.iter())),
        );
        let authors: HashSet<&str> = installed_packages
            .iter()
            .map(|p| p.provenance.author.as_str())
            .filter(|a| !a.is_empty())
            .collect();
        let tools: Vec<String> = ctx.active_tools.iter().map(|t| t.to_lowercase()).collect();

        debug!(
            installed = installed.len(),
            keywords = user_keywords.len(),
            tools = tools.len(),
            "recommending for user"
        );

        let mut recommendations = Vec::new();
        for package in Self::candidates(&index) {
            if !self.settings.include_installed && installed.contains(package.id.as_str()) {
                continue;
            }
            if !ctx.preferred_types.is_empty()
                && !ctx.preferred_types.contains(&package.package_type)
            {
                continue;
            }

            let popularity = popularity_score(package);
            let recency = recency_score(package);
            let similarity = keyword_similarity(&package.keywords, &user_keywords);

            let mut score = popularity * self.settings.popularity_weight
                + recency * self.settings.recency_weight
                + similarity * self.settings.similarity_weight;
            let mut rec = Recommendation::new(package, 0.0);

            if popularity > POPULAR_THRESHOLD {
                rec.add_reason(Reason::Popular);
            }
            if recency > RECENT_THRESHOLD {
                rec.add_reason(Reason::Recent);
            }
            if similarity > SIMILARITY_THRESHOLD {
                rec.add_reason(Reason::SimilarInterests);
            }
            if package.stars >= HIGHLY_RATED_STARS {
                rec.add_reason(Reason::HighlyRated);
            }

            let matched_tool = tools.iter().find(|tool| {
                package
                    .keywords
                    .iter()
                    .any(|k| k.to_lowercase().contains(tool.as_str()))
            });
            if let Some(tool) = matched_tool {
                score += TOOL_MATCH_BONUS;
                rec.add_reason(Reason::MatchesTool(tool.clone()));
            }
            if authors.contains(package.provenance.author.as_str()) {
                score += SAME_AUTHOR_BONUS;
                rec.add_reason(Reason::SameAuthor);
            }
            if package.provenance.verified {
                score += VERIFIED_BONUS;
                rec.add_reason(Reason::Verified);
            }

            rec.score = score.clamp(0.0, 1.0);
            recommendations.push(rec);
        }

        Ok(rank(recommendations, self.settings.max_recommendations))
    }

    /// Packages related to `id`.
    pub fn recommend_similar(&self, id: &str) -> BazaarResult<Vec<Recommendation>> {
        let index = self.service.get_index()?;
        let source = index
            .get(id)
            .ok_or_else(|| RegistryError::PackageNotFound(id.to_string()))?;
        let source_keywords = keyword_counts(&source.keywords);

        let mut recommendations = Vec::new();
        for package in Self::candidates(&index) {
            if package.id == source.id {
                continue;
            }

            let mut rec = Recommendation::new(package, 0.0);
            let mut score = 0.0;

            if package.package_type == source.package_type {
                score += 0.3;
                rec.add_reason(Reason::SameType);
            }
            let author = package.provenance.author.as_str();
            if !author.is_empty() && author == source.provenance.author {
                score += 0.2;
                rec.add_reason(Reason::SameAuthor);
            }
            let similarity = keyword_similarity(&package.keywords, &source_keywords);
            if similarity > 0.0 {
                score += 0.5 * similarity;
                if similarity > SIMILARITY_THRESHOLD {
                    rec.add_reason(Reason::SimilarKeywords);
                }
            }
            let popularity = popularity_score(package);
            score += 0.2 * popularity;
            if popularity > POPULAR_THRESHOLD {
                rec.add_reason(Reason::Popular);
            }
            if are_complementary(package, source) {
                score += 0.25;
                rec.add_reason(Reason::Complementary);
            }

            if score > 0.0 {
                rec.score = score.clamp(0.0, 1.0);
                recommendations.push(rec);
            }
        }

        Ok(rank(recommendations, self.settings.max_recommendations))
    }

    /// Most popular packages, optionally of one type.
    pub fn popular_packages(
        &self,
        package_type: Option<PackageType>,
    ) -> BazaarResult<Vec<Recommendation>> {
        let index = self.service.get_index()?;

        let recommendations = Self::candidates(&index)
            .filter(|p| package_type.map_or(true, |t| p.package_type == t))
            .map(|package| {
                let score = popularity_score(package);
                let mut rec = Recommendation::new(package, score);
                if score > 0.0 {
                    rec.add_reason(Reason::Popular);
                }
                rec
            })
            .collect();

        Ok(rank(recommendations, self.settings.max_recommendations))
    }

    /// Verified, well-starred and popular packages.
    ///
    /// Scores are popularity boosted by 1.5 and are not clamped, so they range above 1.0.
    pub fn featured_packages(&self) -> BazaarResult<Vec<Recommendation>> {
        let index = self.service.get_index()?;

        let recommendations = Self::candidates(&index)
            .filter(|p| p.provenance.verified && p.stars >= FEATURED_MIN_STARS)
            .filter_map(|package| {
                let popularity = popularity_score(package);
                if popularity <= FEATURED_MIN_POPULARITY {
                    return None;
                }
                let mut rec = Recommendation::new(package, popularity * FEATURED_BOOST);
                rec.add_reason(Reason::Featured);
                rec.add_reason(Reason::HighlyRated);
                Some(rec)
            })
            .collect();

        Ok(rank(recommendations, self.settings.max_recommendations))
    }
}
