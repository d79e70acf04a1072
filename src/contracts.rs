//! Contract bindings
//!
//! Uses alloy's `sol!` macro to generate type-safe ABI encoders/decoders for
//! the ERC-20 collateral token and the market group contract that owns trader
//! and liquidity positions.

use alloy::sol;

sol! {
    /// Minimal ERC-20 surface used for approval gating
    #[derive(Debug)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }

    /// Parameters for opening a liquidity position
    #[derive(Debug, Default, PartialEq, Eq)]
    struct LiquidityMintParams {
        uint256 epochId;
        uint256 amountTokenA;
        uint256 amountTokenB;
        uint256 collateralAmount;
        int24 lowerTick;
        int24 upperTick;
        uint256 minAmountTokenA;
        uint256 minAmountTokenB;
        uint256 deadline;
    }

    /// Parameters for adding liquidity to an existing position
    #[derive(Debug, Default, PartialEq, Eq)]
    struct LiquidityIncreaseParams {
        uint256 positionId;
        uint256 collateralAmount;
        uint256 gasTokenAmount;
        uint256 ethTokenAmount;
        uint256 minGasAmount;
        uint256 minEthAmount;
        uint256 deadline;
    }

    /// Parameters for removing liquidity from an existing position
    #[derive(Debug, Default, PartialEq, Eq)]
    struct LiquidityDecreaseParams {
        uint256 positionId;
        uint128 liquidity;
        uint256 minGasAmount;
        uint256 minEthAmount;
        uint256 deadline;
    }

    /// Market group: trader and liquidity position entry points
    #[derive(Debug)]
    interface IMarketGroup {
        function createTraderPosition(
            uint256 marketId,
            int256 size,
            uint256 deltaCollateralLimit,
            uint256 deadline
        ) external returns (uint256 positionId);

        function modifyTraderPosition(
            uint256 positionId,
            int256 size,
            int256 deltaCollateralLimit,
            uint256 deadline
        ) external;

        function createLiquidityPosition(LiquidityMintParams calldata params)
            external
            returns (uint256 id, uint256 requiredCollateralAmount, uint256 totalDepositedCollateralAmount, uint128 uniswapNftId, uint128 liquidity, uint256 addedAmount0, uint256 addedAmount1);

        function increaseLiquidityPosition(LiquidityIncreaseParams calldata params)
            external
            returns (uint128 liquidity, uint256 amount0, uint256 amount1, uint256 requiredCollateralAmount, uint256 totalDepositedCollateralAmount);

        function decreaseLiquidityPosition(LiquidityDecreaseParams calldata params)
            external
            returns (uint256 decreasedAmount0, uint256 decreasedAmount1, uint256 collateralAmount);

        function quoteCreateTraderPosition(uint256 marketId, int256 size)
            external
            returns (uint256 requiredCollateral, uint256 fillPrice, uint256 price18DigitsAfter);

        function quoteModifyTraderPosition(uint256 positionId, int256 size)
            external
            returns (int256 expectedCollateralDelta, int256 closePnL, uint256 fillPrice, uint256 price18DigitsAfter);

        function getSqrtPriceX96(uint256 marketId) external view returns (uint160 sqrtPriceX96);

        function quoteLiquidityPositionTokens(
            uint256 marketId,
            uint256 depositedCollateralAmount,
            uint160 sqrtPriceX96,
            uint160 sqrtPriceAX96,
            uint160 sqrtPriceBX96
        ) external view returns (uint256 amount0, uint256 amount1, uint128 liquidity);

        function getTokensFromLiquidity(
            uint128 liquidity,
            uint160 sqrtPriceX96,
            uint160 sqrtPriceAX96,
            uint160 sqrtPriceBX96
        ) external pure returns (uint256 amount0, uint256 amount1);

        function quoteRequiredCollateral(uint256 positionId, uint128 liquidity)
            external
            view
            returns (uint256 requiredCollateral);
    }
}
