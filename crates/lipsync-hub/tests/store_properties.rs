// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Version properties of the store as seen through the hub.

use lipsync_core::{Command, MorphWeight};
use lipsync_hub::Hub;
use proptest::prelude::*;

fn weights() -> impl Strategy<Value = Vec<MorphWeight>> {
    prop::collection::vec(
        ("[ a-z_]{0,8}", 0.0_f32..1.0).prop_map(|(m, w)| MorphWeight::new(m, w)),
        0..5,
    )
}

proptest! {
    #[test]
    fn versions_step_by_one_and_rejections_do_not_count(
        steps in prop::collection::vec((weights(), prop::option::of(-1.0_f64..1.0)), 1..30),
    ) {
        let hub = Hub::new();
        let mut expected = 0;
        for (w, unit) in steps {
            match unit {
                None => {
                    expected += 1;
                    prop_assert_eq!(hub.set_morph_weights_command(w), Ok(expected));
                }
                Some(unit) => {
                    let res = hub.set_key_frames_command(Default::default(), unit);
                    if unit > 0.0 {
                        expected += 1;
                        prop_assert_eq!(res, Ok(expected));
                    } else {
                        prop_assert!(res.is_err());
                    }
                }
            }
            prop_assert_eq!(hub.current().version, expected);
        }
    }

    #[test]
    fn stored_weights_never_have_blank_names(w in weights()) {
        let hub = Hub::new();
        prop_assert!(hub.set_morph_weights_command(w).is_ok());
        let Command::MorphWeights(stored) = hub.current().command else {
            panic!("expected weights");
        };
        prop_assert!(stored.iter().all(|m| !m.morph.trim().is_empty()));
    }
}
