//! Demo job board adapters.
//!
//! Each board generates a bounded, pseudo-random list of postings from a
//! fixed catalogue. Nothing goes over the network; a short randomized delay
//! stands in for the request latency and ends early on cancellation.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use jobhound_core::context::RunContext;
use jobhound_core::error::AppError;
use jobhound_core::models::{EmploymentType, RawPosting};
use jobhound_core::traits::Source;

/// Salary band: low end in `low_base..low_base+low_span`, high end likewise.
#[derive(Debug, Clone, Copy)]
pub struct SalaryBand {
    pub low_base: u32,
    pub low_span: u32,
    pub high_base: u32,
    pub high_span: u32,
    /// Probability that a posting advertises a salary at all.
    pub chance: f64,
}

/// Static description of one demo board.
#[derive(Debug, Clone, Copy)]
pub struct BoardProfile {
    pub name: &'static str,
    pub url_prefix: &'static str,
    pub url_id_range: u32,
    pub titles: &'static [&'static str],
    pub companies: &'static [&'static str],
    pub locations: &'static [&'static str],
    pub employment_types: &'static [EmploymentType],
    pub min_jobs: usize,
    pub max_jobs: usize,
    pub remote_chance: f64,
    pub max_age_days: u32,
    pub max_delay: Duration,
    pub salary: SalaryBand,
    pub describe: fn(&str, &mut XorShift) -> String,
}

pub const INDEED: BoardProfile = BoardProfile {
    name: "indeed",
    url_prefix: "https://indeed.com/job/",
    url_id_range: 100_000,
    titles: &[
        "Senior Go Developer",
        "Backend Engineer - Golang",
        "Full Stack Developer (Go/React)",
        "DevOps Engineer",
        "Site Reliability Engineer",
        "Cloud Platform Engineer",
        "Microservices Developer",
        "Software Engineer - Backend",
    ],
    companies: &[
        "Tech Corp",
        "StartupXYZ",
        "CloudSystems Inc",
        "DataFlow Technologies",
        "WebScale Solutions",
    ],
    locations: &[
        "San Francisco, CA",
        "New York, NY",
        "Remote",
        "Austin, TX",
        "Seattle, WA",
        "Boston, MA",
    ],
    employment_types: &[
        EmploymentType::FullTime,
        EmploymentType::Contract,
        EmploymentType::PartTime,
    ],
    min_jobs: 5,
    max_jobs: 10,
    remote_chance: 0.5,
    max_age_days: 30,
    max_delay: Duration::from_millis(500),
    salary: SalaryBand {
        low_base: 100,
        low_span: 100,
        high_base: 150,
        high_span: 100,
        chance: 0.7,
    },
    describe: describe_indeed,
};

pub const LINKEDIN: BoardProfile = BoardProfile {
    name: "linkedin",
    url_prefix: "https://linkedin.com/jobs/view/",
    url_id_range: 1_000_000,
    titles: &[
        "Golang Software Engineer",
        "Backend Developer - Go",
        "Principal Engineer",
        "Staff Software Engineer",
        "Distributed Systems Engineer",
        "API Platform Engineer",
    ],
    companies: &[
        "Meta",
        "Google",
        "Amazon",
        "Microsoft",
        "Netflix",
        "Uber",
        "Airbnb",
    ],
    locations: &[
        "Menlo Park, CA",
        "Mountain View, CA",
        "Remote (US)",
        "Chicago, IL",
        "Denver, CO",
    ],
    employment_types: &[EmploymentType::FullTime],
    min_jobs: 3,
    max_jobs: 8,
    remote_chance: 0.6,
    max_age_days: 14,
    max_delay: Duration::from_millis(700),
    salary: SalaryBand {
        low_base: 120,
        low_span: 150,
        high_base: 200,
        high_span: 150,
        chance: 0.8,
    },
    describe: describe_linkedin,
};

pub const GLASSDOOR: BoardProfile = BoardProfile {
    name: "glassdoor",
    url_prefix: "https://glassdoor.com/job-listing/",
    url_id_range: 500_000,
    titles: &[
        "Senior Backend Engineer",
        "Go Developer",
        "Infrastructure Engineer",
        "Platform Engineer",
    ],
    companies: &[
        "Stripe",
        "Square",
        "Coinbase",
        "Robinhood",
        "Shopify",
        "Twilio",
    ],
    locations: &["Remote"],
    employment_types: &[EmploymentType::FullTime],
    min_jobs: 4,
    max_jobs: 7,
    remote_chance: 1.0,
    max_age_days: 20,
    max_delay: Duration::from_millis(600),
    salary: SalaryBand {
        low_base: 110,
        low_span: 120,
        high_base: 180,
        high_span: 120,
        chance: 1.0,
    },
    describe: describe_glassdoor,
};

fn describe_indeed(query: &str, rng: &mut XorShift) -> String {
    format!(
        "Looking for an experienced developer with {}+ years in Go. {query}",
        rng.below(5) + 1
    )
}

fn describe_linkedin(query: &str, _: &mut XorShift) -> String {
    format!("We are looking for talented engineers with expertise in {query}")
}

fn describe_glassdoor(query: &str, _: &mut XorShift) -> String {
    format!("Join our team working with {query} and cutting-edge technology")
}

/// Small xorshift64* generator. Good enough for demo data, never for keys.
#[derive(Debug, Clone)]
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform-ish value in `0..bound`; 0 when `bound` is 0.
    pub fn below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        (self.next_u64() % u64::from(bound)) as u32
    }

    /// Value in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len() as u32) as usize]
    }
}

/// A demo board adapter driven by a [`BoardProfile`].
#[derive(Debug, Clone)]
pub struct BoardSource {
    profile: BoardProfile,
    seed: u64,
    max_delay: Duration,
}

impl BoardSource {
    /// Board seeded from the clock, so repeated runs produce different data.
    pub fn new(profile: BoardProfile) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self {
            max_delay: profile.max_delay,
            profile,
            seed,
        }
    }

    pub fn indeed() -> Self {
        Self::new(INDEED)
    }

    pub fn linkedin() -> Self {
        Self::new(LINKEDIN)
    }

    pub fn glassdoor() -> Self {
        Self::new(GLASSDOOR)
    }

    /// Fix the seed: the same `(seed, query)` always yields the same postings.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Upper bound on the simulated latency. Zero disables it.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    /// Generate the postings for `query` without any delay.
    pub fn generate(&self, query: &str) -> Vec<RawPosting> {
        let mut rng = XorShift::new(self.seed ^ query_seed(query));
        let p = &self.profile;
        let spread = (p.max_jobs - p.min_jobs + 1) as u32;
        let count = p.min_jobs + rng.below(spread) as usize;
        let now = Utc::now();

        (0..count)
            .map(|_| {
                let title = rng.pick(p.titles).to_string();
                let company = rng.pick(p.companies).to_string();
                let location = rng.pick(p.locations).to_string();
                let description = (p.describe)(query, &mut rng);
                let url = format!("{}{}", p.url_prefix, rng.below(p.url_id_range));
                let remote = rng.unit() < p.remote_chance;
                let employment_type = *rng.pick(p.employment_types);
                let age_days = rng.below(p.max_age_days);
                let salary = (rng.unit() < p.salary.chance).then(|| {
                    format!(
                        "${}k - ${}k",
                        p.salary.low_base + rng.below(p.salary.low_span),
                        p.salary.high_base + rng.below(p.salary.high_span)
                    )
                });

                RawPosting {
                    title,
                    company,
                    location,
                    salary,
                    description,
                    url,
                    source: p.name.to_string(),
                    remote,
                    employment_type,
                    posted_at: Some(now - chrono::Duration::days(i64::from(age_days))),
                }
            })
            .collect()
    }

    fn delay_for(&self, query: &str) -> Duration {
        let max_ms = self.max_delay.as_millis() as u32;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = XorShift::new(self.seed.rotate_left(17) ^ query_seed(query));
        Duration::from_millis(u64::from(rng.below(max_ms)))
    }
}

#[async_trait]
impl Source for BoardSource {
    fn name(&self) -> &str {
        self.profile.name
    }

    async fn scrape(&self, ctx: &RunContext, query: &str) -> Result<Vec<RawPosting>, AppError> {
        let delay = self.delay_for(query);
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                cause = ctx.done() => return Err(AppError::Cancelled(cause)),
            }
        }
        ctx.check()?;

        let postings = self.generate(query);
        tracing::debug!(
            source = %self.profile.name,
            %query,
            count = postings.len(),
            delay_ms = delay.as_millis() as u64,
            "Generated demo postings"
        );
        Ok(postings)
    }
}

/// FNV-1a over the query bytes, so different queries get different data.
fn query_seed(query: &str) -> u64 {
    query.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
