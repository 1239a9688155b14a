use super::measured::Measured;
use crate::domain::racing::HandlerRole;
use std::sync::LazyLock;

/// Declares a fixed-schema feature group: the field list is the column order.
macro_rules! feature_group {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            $(pub $field: Measured,)+
        }

        impl $name {
            pub const NAMES: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn values(&self) -> Vec<f64> {
                vec![$(self.$field.value()),+]
            }
        }
    };
}

feature_group!(
    /// Draw position within the field.
    IdentityFeatures {
        gate,
        gate_ratio,
        field_size,
    }
);

feature_group!(
    ConditionFeatures {
        distance_m,
        surface_code,
        going_code,
        off_going,
    }
);

feature_group!(
    PhysicalFeatures {
        age,
        sex_code,
        carried_weight,
        body_weight,
        body_weight_change,
    }
);

feature_group!(
    /// Pre-race market view of the runner.
    MarketFeatures {
        odds_log,
        popularity,
    }
);

feature_group!(
    /// Leaderboard statistics for a jockey, trainer or sire.
    HandlerFeatures {
        win_rate,
        place_rate,
        show_rate,
        starts,
        recent_wins,
    }
);

feature_group!(
    /// Rolling performance windows over the competitor's own runs.
    FormFeatures {
        avg_finish_last_3,
        avg_finish_last_5,
        avg_finish_last_10,
        avg_finish_all,
        best_finish,
        last_finish,
        win_rate,
        place_rate,
        show_rate,
        starts,
        days_since_last,
    }
);

feature_group!(
    AptitudeFeatures {
        venue_win_rate,
        venue_place_rate,
        venue_starts,
        distance_win_rate,
        distance_place_rate,
        surface_win_rate,
        surface_place_rate,
        going_place_rate,
    }
);

feature_group!(
    /// Parsed from the call-point positions of past runs.
    RunningStyleFeatures {
        early_position_ratio,
        late_gain,
        front_runner_rate,
        closer_rate,
    }
);

feature_group!(
    SeasonalFeatures {
        month_sin,
        month_cos,
    }
);

feature_group!(
    PaceFeatures {
        avg_final_split,
        best_final_split,
        avg_speed_mps,
    }
);

feature_group!(
    /// Performance conditional on the market's popularity tier.
    PopularityFeatures {
        favourite_win_rate,
        favourite_runs,
        longshot_show_rate,
        avg_popularity,
        outperformance,
    }
);

/// Handler blocks in column order; the extractor fills them in the same order.
pub const HANDLER_ROLES: [HandlerRole; 3] = [HandlerRole::Jockey, HandlerRole::Trainer, HandlerRole::Sire];

/// Ordered column names. Training matrices and live inference rows both use this list.
static FEATURE_SCHEMA: LazyLock<Vec<String>> = LazyLock::new(|| {
    let mut names = Vec::new();
    let mut extend = |prefix: &str, group: &[&str]| {
        names.extend(group.iter().map(|n| format!("{}_{}", prefix, n)));
    };
    extend("id", IdentityFeatures::NAMES);
    extend("cond", ConditionFeatures::NAMES);
    extend("phys", PhysicalFeatures::NAMES);
    extend("mkt", MarketFeatures::NAMES);
    for role in HANDLER_ROLES {
        extend(&role.to_string(), HandlerFeatures::NAMES);
    }
    extend("form", FormFeatures::NAMES);
    extend("apt", AptitudeFeatures::NAMES);
    extend("style", RunningStyleFeatures::NAMES);
    extend("season", SeasonalFeatures::NAMES);
    extend("pace", PaceFeatures::NAMES);
    extend("pop", PopularityFeatures::NAMES);
    names
});

pub fn feature_schema() -> &'static [String] {
    FEATURE_SCHEMA.as_slice()
}

pub fn feature_count() -> usize {
    FEATURE_SCHEMA.len()
}

/// Full feature set for one entrant, composed of the fixed-schema groups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    pub competitor_id: String,
    pub identity: IdentityFeatures,
    pub conditions: ConditionFeatures,
    pub physical: PhysicalFeatures,
    pub market: MarketFeatures,
    pub jockey: HandlerFeatures,
    pub trainer: HandlerFeatures,
    pub sire: HandlerFeatures,
    pub form: FormFeatures,
    pub aptitude: AptitudeFeatures,
    pub style: RunningStyleFeatures,
    pub seasonal: SeasonalFeatures,
    pub pace: PaceFeatures,
    pub popularity: PopularityFeatures,
}

impl FeatureVector {
    pub fn handler_mut(&mut self, role: HandlerRole) -> &mut HandlerFeatures {
        match role {
            HandlerRole::Jockey => &mut self.jockey,
            HandlerRole::Trainer => &mut self.trainer,
            HandlerRole::Sire => &mut self.sire,
        }
    }

    /// Materialises the row in [`feature_schema`] order.
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(feature_count());
        row.extend(self.identity.values());
        row.extend(self.conditions.values());
        row.extend(self.physical.values());
        row.extend(self.market.values());
        row.extend(self.jockey.values());
        row.extend(self.trainer.values());
        row.extend(self.sire.values());
        row.extend(self.form.values());
        row.extend(self.aptitude.values());
        row.extend(self.style.values());
        row.extend(self.seasonal.values());
        row.extend(self.pace.values());
        row.extend(self.popularity.values());
        row
    }
}

pub fn column_index(name: &str) -> Option<usize> {
    FEATURE_SCHEMA.iter().position(|n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_row_length_matches_schema() {
        let fv = FeatureVector::default();
        assert_eq!(fv.to_row().len(), feature_schema().len());
    }

    #[test]
    fn test_schema_names_are_unique() {
        let unique: HashSet<&String> = feature_schema().iter().collect();
        assert_eq!(unique.len(), feature_schema().len());
    }

    #[test]
    fn test_column_positions() {
        let fv = FeatureVector {
            identity: IdentityFeatures {
                gate: Measured::Observed(7.0),
                ..Default::default()
            },
            trainer: HandlerFeatures {
                win_rate: Measured::Observed(0.2),
                ..Default::default()
            },
            ..Default::default()
        };
        let row = fv.to_row();
        assert_eq!(row[0], 7.0);
        let idx = column_index("trainer_win_rate").unwrap();
        assert_eq!(row[idx], 0.2);
        assert_eq!(column_index("pop_outperformance"), Some(feature_count() - 1));
    }

    #[test]
    fn test_handler_blocks_follow_role_order() {
        let mut last = 0;
        for (i, role) in HANDLER_ROLES.into_iter().enumerate() {
            let mut fv = FeatureVector::default();
            fv.handler_mut(role).win_rate = Measured::Observed(0.5 + i as f64);
            let idx = column_index(&format!("{}_win_rate", role)).unwrap();
            assert_eq!(fv.to_row()[idx], 0.5 + i as f64);
            assert!(idx > last);
            last = idx;
        }
    }
}
