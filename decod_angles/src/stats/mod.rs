pub mod circular;
pub mod rank;
pub mod summary;

pub use circular::{
    angle_acc, angle_acc_axis, bin_centers, circ_mean, circ_mean_axis, circ_tuning, wrap_angle,
};
pub use rank::{repeated_spearman, spearman_correlation, wilcoxon, WilcoxonResult};
pub use summary::{
    nan_count, nan_mean, nan_mean_axis, nan_sem, nan_sem_axis, nan_std, wilcoxon_axis, MeanSem,
};
