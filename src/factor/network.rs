use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use serde::{Deserialize, Serialize};

use super::numerics::{log_returns, mean, variance};
use super::{
    require_last, FactorFailure, FactorForecaster, ForecastContext, ForecastMethod, HistoryWindow,
    Projection,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub from: String,
    pub to: String,
    pub km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCostConfig {
    /// Refinery or terminal nodes that supply the network.
    pub sources: Vec<String>,
    pub edges: Vec<NetworkEdge>,
    /// Haul distance at which a unit change in freight cost passes through in full.
    pub reference_km: f64,
    pub trend_window: usize,
    pub min_sigma: f64,
    pub min_history: usize,
}

impl Default for NetworkCostConfig {
    fn default() -> Self {
        let edge = |from: &str, to: &str, km: f64| NetworkEdge {
            from: from.to_string(),
            to: to.to_string(),
            km,
        };
        Self {
            sources: vec!["ulsan".to_string(), "yeosu".to_string(), "daesan".to_string()],
            edges: vec![
                edge("ulsan", "busan", 50.0),
                edge("ulsan", "daegu", 110.0),
                edge("daegu", "daejeon", 150.0),
                edge("daejeon", "seoul", 160.0),
                edge("daesan", "seoul", 120.0),
                edge("daesan", "daejeon", 110.0),
                edge("yeosu", "gwangju", 110.0),
                edge("gwangju", "daejeon", 170.0),
                edge("seoul", "gangwon", 150.0),
                edge("busan", "jeju", 290.0),
            ],
            reference_km: 150.0,
            trend_window: 28,
            min_sigma: 0.001,
            min_history: 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    dist: f64,
    node: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Freight cost trend scaled by the average shortest haul from the supply
/// terminals to every demand node.
#[derive(Debug, Clone, Default)]
pub struct NetworkCostForecaster {
    cfg: NetworkCostConfig,
}

impl NetworkCostForecaster {
    pub fn new(cfg: NetworkCostConfig) -> Self {
        Self { cfg }
    }

    /// Multi-source Dijkstra over the undirected haul graph.
    pub fn shortest_hauls(&self) -> BTreeMap<String, f64> {
        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for e in &self.cfg.edges {
            let next = index.len();
            index.entry(e.from.as_str()).or_insert(next);
            let next = index.len();
            index.entry(e.to.as_str()).or_insert(next);
        }
        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); index.len()];
        for e in &self.cfg.edges {
            let (a, b) = (index[e.from.as_str()], index[e.to.as_str()]);
            let km = e.km.max(0.0);
            adj[a].push((b, km));
            adj[b].push((a, km));
        }

        let mut dist = vec![f64::INFINITY; index.len()];
        let mut heap = BinaryHeap::new();
        for s in &self.cfg.sources {
            if let Some(&i) = index.get(s.as_str()) {
                dist[i] = 0.0;
                heap.push(Frontier { dist: 0.0, node: i });
            }
        }
        while let Some(Frontier { dist: d, node }) = heap.pop() {
            if d > dist[node] {
                continue;
            }
            for &(next, km) in &adj[node] {
                let candidate = d + km;
                if candidate < dist[next] {
                    dist[next] = candidate;
                    heap.push(Frontier {
                        dist: candidate,
                        node: next,
                    });
                }
            }
        }
        index
            .into_iter()
            .filter(|(_, i)| dist[*i].is_finite())
            .map(|(name, i)| (name.to_string(), dist[i]))
            .collect()
    }

    /// Share of a freight-cost change that reaches the average pump price.
    pub fn cost_sensitivity(&self) -> f64 {
        let hauls: Vec<f64> = self
            .shortest_hauls()
            .into_iter()
            .filter(|(node, _)| !self.cfg.sources.contains(node))
            .map(|(_, km)| km)
            .collect();
        if hauls.is_empty() || self.cfg.reference_km <= f64::EPSILON {
            return 1.0;
        }
        mean(&hauls) / self.cfg.reference_km
    }
}

impl FactorForecaster for NetworkCostForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::NetworkCost
    }

    fn min_history(&self) -> usize {
        self.cfg.min_history.max(3)
    }

    fn project(
        &self,
        window: &HistoryWindow,
        ctx: &ForecastContext,
    ) -> Result<Projection, FactorFailure> {
        let values = window.values();
        require_last(&values)?;
        let r = log_returns(&values);
        if r.is_empty() {
            return Err(FactorFailure::Numerical("no usable returns".to_string()));
        }
        let span = self.cfg.trend_window.clamp(1, r.len());
        let trend = mean(&r[r.len() - span..]);
        let k = self.cost_sensitivity();
        let sigma2 = (variance(&r) * k * k).max(self.cfg.min_sigma.powi(2));

        let mut out = Projection::with_capacity(ctx.horizon);
        for h in 1..=ctx.horizon {
            out.push(k * ((trend * h as f64).exp() - 1.0), sigma2 * h as f64);
        }
        Ok(out)
    }
}
