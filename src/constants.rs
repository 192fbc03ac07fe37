//! Pretrained network constants and fixed control-law limits.
//!
//! The weights were fitted offline against recorded landing runs; reproduce
//! them exactly rather than re-deriving.

// Layer widths
pub const INPUT_WIDTH: usize = 2;
pub const HIDDEN_WIDTH: usize = 4;
pub const OUTPUT_WIDTH: usize = 2;

// Activation
pub const SIGMOID_LAMBDA: f64 = 0.8;
pub const SIGMOID_SATURATION: f64 = 100.0;

// Pretrained weights, row-major (one row per destination unit)
pub const WEIGHTS_INPUT_HIDDEN: [[f64; INPUT_WIDTH]; HIDDEN_WIDTH] = [
    [-0.49750877912392033, 1.2016780567776761],
    [3.9012450597203903, 0.6675107395150973],
    [0.6128513501539526, 3.0650919529059593],
    [-3.501673328451882, 2.191063728579324],
];

pub const WEIGHTS_HIDDEN_OUTPUT: [[f64; HIDDEN_WIDTH]; OUTPUT_WIDTH] = [
    [
        1.873447273808668,
        3.3091160965287,
        -4.627440859589127,
        0.907365032837498,
    ],
    [
        11.292756770956506,
        -2.96557321629238,
        -2.058701884008144,
        -4.757812016009416,
    ],
];

// Normalisation bounds: distance-to-target in, velocity out
pub const MIN_INPUT: [f64; INPUT_WIDTH] = [-611.633297, 65.904359];
pub const MAX_INPUT: [f64; INPUT_WIDTH] = [610.366748, 749.980887];
pub const MIN_OUTPUT: [f64; OUTPUT_WIDTH] = [-4.999903, -4.999939];
pub const MAX_OUTPUT: [f64; OUTPUT_WIDTH] = [8.000000, 4.999938];

// Reconciliation
pub const NETWORK_TRUST_MIN_VERTICAL: f64 = 150.0;
pub const NETWORK_STALL_VY: f64 = 0.1;
pub const NETWORK_IMPLAUSIBLE_VX: f64 = 5.0;
pub const NETWORK_HORIZONTAL_TRUST_RANGE: f64 = 100.0;
pub const TARGET_VY_MIN: f64 = 0.1;
pub const TARGET_VY_MAX: f64 = 1.5;
pub const TARGET_VY_MAX_IMPLAUSIBLE: f64 = 2.0;

// Host loop cadence
pub const HOST_FPS: u32 = 60;

// Attitude envelope, degrees
pub const ATTITUDE_LIMIT_LOW: f64 = 30.0;
pub const ATTITUDE_LIMIT_HIGH: f64 = 330.0;
