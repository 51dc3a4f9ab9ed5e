//! Sampler names and the scheduler configuration each one selects

use serde::Serialize;

/// Scheduler family understood by the diffusion engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Euler,
    EulerAncestral,
    DpmSolverMultistep,
    DpmSolverSinglestep,
}

/// Concrete scheduler setup installed on the engine for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerConfig {
    pub kind: SchedulerKind,
    pub karras_sigmas: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm_type: Option<&'static str>,
}

/// Sampling algorithm selectable per job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampler {
    Euler,
    EulerAncestral,
    DpmPp2mKarras,
    DpmPp2mSdeKarras,
    DpmPp2mSde,
}

impl Sampler {
    pub const ALL: [Sampler; 5] = [
        Sampler::Euler,
        Sampler::EulerAncestral,
        Sampler::DpmPp2mKarras,
        Sampler::DpmPp2mSdeKarras,
        Sampler::DpmPp2mSde,
    ];

    /// Used whenever a requested name is not recognised
    pub const DEFAULT: Sampler = Sampler::EulerAncestral;

    /// Resolve a client-supplied name; unknown names map to `fallback`
    /// (normally [`Sampler::DEFAULT`])
    pub fn resolve(name: &str, fallback: Sampler) -> Sampler {
        Self::lookup(name).unwrap_or(fallback)
    }

    /// Exact lookup, `None` for unknown names
    pub fn lookup(name: &str) -> Option<Sampler> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Name as clients send it
    pub fn name(&self) -> &'static str {
        match self {
            Sampler::Euler => "Euler",
            Sampler::EulerAncestral => "Euler a",
            Sampler::DpmPp2mKarras => "DPM++ 2M Karras",
            Sampler::DpmPp2mSdeKarras => "DPM++ 2M SDE Karras",
            Sampler::DpmPp2mSde => "DPM++ 2M SDE",
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        match self {
            Sampler::Euler => SchedulerConfig {
                kind: SchedulerKind::Euler,
                karras_sigmas: false,
                algorithm_type: None,
            },
            Sampler::EulerAncestral => SchedulerConfig {
                kind: SchedulerKind::EulerAncestral,
                karras_sigmas: false,
                algorithm_type: None,
            },
            Sampler::DpmPp2mKarras => SchedulerConfig {
                kind: SchedulerKind::DpmSolverMultistep,
                karras_sigmas: true,
                algorithm_type: None,
            },
            Sampler::DpmPp2mSdeKarras => SchedulerConfig {
                kind: SchedulerKind::DpmSolverMultistep,
                karras_sigmas: true,
                algorithm_type: Some("sde-dpmsolver++"),
            },
            Sampler::DpmPp2mSde => SchedulerConfig {
                kind: SchedulerKind::DpmSolverSinglestep,
                karras_sigmas: true,
                algorithm_type: None,
            },
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
